//! Compile-time pack assembly
//!
//! A `PackInfo` is a [`Pack`] plus everything needed to write it: the
//! source file of every entry, parsables, executables and update checks.

use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::trace;
use walkdir::WalkDir;

use crate::error::{CompilerError, CompilerResult};
use crate::metadata::{ExecutableFile, OverridePolicy, Pack, PackFile, ParsableFile, UpdateCheck};
use crate::platform::OsConstraint;

/// Patterns skipped by every fileset.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    "**/._*",
    "**/CVS",
    "**/CVS/**",
    "**/.cvsignore",
    "**/.svn",
    "**/.svn/**",
    "**/.git",
    "**/.git/**",
    "**/.gitignore",
    "**/.hg",
    "**/.hg/**",
    "**/.DS_Store",
];

/// Attributes shared by every file added from one descriptor element.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub override_policy: OverridePolicy,
    pub condition: Option<String>,
    pub os_constraints: Vec<OsConstraint>,
}

/// A pack file together with where its bytes come from.
#[derive(Debug, Clone)]
pub struct SourcedFile {
    pub file: PackFile,
    /// Absolute source path; `None` for directories
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PackInfo {
    pub pack: Pack,
    pub files: Vec<SourcedFile>,
    pub parsables: Vec<ParsableFile>,
    pub executables: Vec<ExecutableFile>,
    pub update_checks: Vec<UpdateCheck>,
    base_dir: PathBuf,
    targets: HashSet<String>,
}

impl PackInfo {
    pub fn new(pack: Pack, base_dir: &Path) -> Self {
        Self {
            pack,
            files: Vec::new(),
            parsables: Vec::new(),
            executables: Vec::new(),
            update_checks: Vec::new(),
            base_dir: base_dir.to_path_buf(),
            targets: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.pack.name
    }

    fn resolve(&self, src: &str) -> PathBuf {
        let path = Path::new(src);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Path stored in the pack file, relative to the base dir when possible.
    fn relative_source(&self, source: &Path) -> String {
        source
            .strip_prefix(&self.base_dir)
            .unwrap_or(source)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn check_target(&mut self, target: &str) -> CompilerResult<()> {
        if !self.targets.insert(target.to_string()) {
            return Err(CompilerError::DuplicateTarget {
                pack: self.pack.name.clone(),
                target: target.to_string(),
            });
        }
        Ok(())
    }

    /// Add a single file or directory entry at an exact target path.
    pub fn add_entry(&mut self, source: &Path, target: String, options: &FileOptions) -> CompilerResult<()> {
        let metadata = std::fs::metadata(source).map_err(|_| CompilerError::SourceNotFound {
            pack: self.pack.name.clone(),
            path: source.to_path_buf(),
        })?;
        self.check_target(&target)?;

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let is_directory = metadata.is_dir();

        trace!("{}: {:?} -> {}", self.pack.name, source, target);
        self.files.push(SourcedFile {
            file: PackFile {
                source: self.relative_source(source),
                target,
                length: if is_directory { 0 } else { metadata.len() },
                mtime,
                os_constraints: options.os_constraints.clone(),
                override_policy: options.override_policy,
                condition: options.condition.clone(),
                is_directory,
                executable: is_executable(&metadata),
                checksum: None,
            },
            source: (!is_directory).then(|| source.to_path_buf()),
        });
        Ok(())
    }

    /// `<file src targetdir>`: a file lands at `targetdir/name`; a directory
    /// is added recursively below `targetdir/name`.
    pub fn add_file(&mut self, src: &str, target_dir: &str, options: &FileOptions) -> CompilerResult<()> {
        let source = self.resolve(src);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CompilerError::SourceNotFound {
                pack: self.pack.name.clone(),
                path: source.clone(),
            })?;

        if source.is_dir() {
            let root = join_target(target_dir, &name);
            for entry in WalkDir::new(&source).sort_by_file_name() {
                let entry = entry.map_err(|_| CompilerError::SourceNotFound {
                    pack: self.pack.name.clone(),
                    path: source.clone(),
                })?;
                let rel = entry.path().strip_prefix(&source).unwrap_or(entry.path());
                let target = if rel.as_os_str().is_empty() {
                    root.clone()
                } else {
                    join_target(&root, &rel.to_string_lossy().replace('\\', "/"))
                };
                self.add_entry(entry.path(), target, options)?;
            }
            Ok(())
        } else {
            self.add_entry(&source, join_target(target_dir, &name), options)
        }
    }

    /// `<singlefile src target>`
    pub fn add_single_file(&mut self, src: &str, target: &str, options: &FileOptions) -> CompilerResult<()> {
        let source = self.resolve(src);
        if source.is_dir() {
            return Err(CompilerError::InvalidValue {
                what: "singlefile src (directories need <file> or <fileset>)".to_string(),
                value: src.to_string(),
            });
        }
        self.add_entry(&source, target.to_string(), options)
    }

    /// `<fileset dir targetdir>` with include/exclude patterns relative to
    /// `dir`. Without includes everything is taken.
    pub fn add_file_set(
        &mut self,
        dir: &str,
        target_dir: &str,
        includes: &[String],
        excludes: &[String],
        case_sensitive: bool,
        options: &FileOptions,
    ) -> CompilerResult<()> {
        let root = self.resolve(dir);
        if !root.is_dir() {
            return Err(CompilerError::SourceNotFound {
                pack: self.pack.name.clone(),
                path: root,
            });
        }

        let includes = if includes.is_empty() {
            vec![compile_pattern("**")?]
        } else {
            includes.iter().map(|p| compile_pattern(p)).collect::<CompilerResult<Vec<_>>>()?
        };
        let excludes = excludes
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_EXCLUDES.iter().copied())
            .map(compile_pattern)
            .collect::<CompilerResult<Vec<_>>>()?;
        let match_options = MatchOptions {
            case_sensitive,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|_| CompilerError::SourceNotFound {
                pack: self.pack.name.clone(),
                path: root.clone(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let included = includes.iter().any(|p| p.matches_with(&rel, match_options));
            let excluded = excludes.iter().any(|p| p.matches_with(&rel, match_options));
            if included && !excluded {
                self.add_entry(entry.path(), join_target(target_dir, &rel), options)?;
            }
        }
        Ok(())
    }

    pub fn add_parsable(&mut self, parsable: ParsableFile) {
        self.parsables.push(parsable);
    }

    pub fn add_executable(&mut self, executable: ExecutableFile) {
        self.executables.push(executable);
    }

    pub fn add_update_check(&mut self, check: UpdateCheck) {
        self.update_checks.push(check);
    }

    /// Sum of file lengths.
    pub fn file_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.file.length).sum()
    }
}

/// Ant-style pattern: a trailing `/` matches everything below.
fn compile_pattern(pattern: &str) -> CompilerResult<Pattern> {
    let mut p = pattern.trim().replace('\\', "/");
    if p.ends_with('/') {
        p.push_str("**");
    }
    Pattern::new(&p).map_err(|source| CompilerError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn join_target(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    !metadata.is_dir() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("lib/sub")).unwrap();
        fs::create_dir_all(dir.path().join("lib/.git")).unwrap();
        fs::write(dir.path().join("lib/a.so"), b"aaaa").unwrap();
        fs::write(dir.path().join("lib/sub/b.so"), b"bb").unwrap();
        fs::write(dir.path().join("lib/sub/notes.txt"), b"n").unwrap();
        fs::write(dir.path().join("lib/.git/config"), b"x").unwrap();
        fs::write(dir.path().join("README"), b"readme").unwrap();
        dir
    }

    fn targets(info: &PackInfo) -> Vec<&str> {
        info.files.iter().map(|f| f.file.target.as_str()).collect()
    }

    #[test]
    fn test_add_file_and_duplicate_target() {
        let dir = fixture();
        let mut info = PackInfo::new(Pack::new("Core"), dir.path());
        info.add_file("README", "$INSTALL_PATH", &FileOptions::default()).unwrap();
        assert_eq!(targets(&info), vec!["$INSTALL_PATH/README"]);
        assert_eq!(info.files[0].file.length, 6);
        assert_eq!(info.files[0].file.source, "README");

        let err = info
            .add_single_file("README", "$INSTALL_PATH/README", &FileOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompilerError::DuplicateTarget { .. }));
    }

    #[test]
    fn test_add_directory_recursively() {
        let dir = fixture();
        let mut info = PackInfo::new(Pack::new("Core"), dir.path());
        info.add_file("lib/sub", "$INSTALL_PATH", &FileOptions::default()).unwrap();
        assert_eq!(
            targets(&info),
            vec!["$INSTALL_PATH/sub", "$INSTALL_PATH/sub/b.so", "$INSTALL_PATH/sub/notes.txt"]
        );
        assert!(info.files[0].file.is_directory);
        assert!(info.files[0].source.is_none());
        assert_eq!(info.file_bytes(), 3);
    }

    #[test]
    fn test_fileset_patterns_and_default_excludes() {
        let dir = fixture();
        let mut info = PackInfo::new(Pack::new("Core"), dir.path());
        info.add_file_set(
            "lib",
            "$INSTALL_PATH/lib",
            &["**/*.so".to_string()],
            &[],
            true,
            &FileOptions::default(),
        )
        .unwrap();
        assert_eq!(targets(&info), vec!["$INSTALL_PATH/lib/a.so", "$INSTALL_PATH/lib/sub/b.so"]);

        let mut all = PackInfo::new(Pack::new("All"), dir.path());
        all.add_file_set("lib", "$INSTALL_PATH/lib", &[], &["sub/".to_string()], true, &FileOptions::default())
            .unwrap();
        assert_eq!(targets(&all), vec!["$INSTALL_PATH/lib/a.so"]);
    }

    #[test]
    fn test_missing_source() {
        let dir = fixture();
        let mut info = PackInfo::new(Pack::new("Core"), dir.path());
        let err = info.add_file("nope.txt", "$INSTALL_PATH", &FileOptions::default()).unwrap_err();
        assert!(matches!(err, CompilerError::SourceNotFound { .. }));
    }
}
