use crate::environment::{Environment, EnvironmentError};
use crate::language::{errors::ParseErrors, parser::parse_signature};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const SIGNATURE_EXTENSION: &str = "sig";
pub const LIBRARY_PATH_VAR: &str = "SIG_PATH";

const BUILTIN: &str = include_str!("builtin.sig");
const BUILTIN_NAME: &str = "<builtin>";

#[derive(Debug)]
pub struct FileErrors {
    pub path: PathBuf,
    pub source: String,
    pub errors: ParseErrors,
}

#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    Syntax(Vec<FileErrors>),
    LibraryNotFound {
        name: String,
    },
}

#[derive(Clone, Debug)]
pub enum SourcePath {
    Builtin,
    Library { name: String, path: PathBuf },
    Path(PathBuf),
}

/// Configures where signature files come from and loads them into an
/// environment: the bundled core signatures unless disabled, libraries
/// found under the `SIG_PATH` roots, and explicitly added files or
/// directories.
#[derive(Debug, Default)]
pub struct EnvironmentLoader {
    libraries: Vec<String>,
    paths: Vec<PathBuf>,
    no_builtin: bool,
    library_roots: Vec<PathBuf>,
}

impl EnvironmentLoader {
    pub fn new() -> Self {
        let library_roots = env::var(LIBRARY_PATH_VAR)
            .map(|value| value.split(':').map(PathBuf::from).collect())
            .unwrap_or_default();
        Self {
            library_roots,
            ..Self::default()
        }
    }

    pub fn add_library(&mut self, name: impl Into<String>) {
        self.libraries.push(name.into());
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn add_library_root(&mut self, path: impl Into<PathBuf>) {
        self.library_roots.push(path.into());
    }

    pub fn no_builtin(&mut self, flag: bool) {
        self.no_builtin = flag;
    }

    /// The configured sources in load order, with libraries resolved.
    pub fn sources(&self) -> Result<Vec<SourcePath>, LoadError> {
        let mut sources = Vec::new();
        if !self.no_builtin {
            sources.push(SourcePath::Builtin);
        }
        for name in &self.libraries {
            sources.push(SourcePath::Library {
                name: name.clone(),
                path: self.find_library(name)?,
            });
        }
        for path in &self.paths {
            sources.push(SourcePath::Path(path.clone()));
        }
        Ok(sources)
    }

    pub fn load(&self) -> Result<(Environment, Vec<EnvironmentError>), LoadError> {
        let mut environment = Environment::new();
        let mut environment_errors = Vec::new();
        let mut file_errors = Vec::new();

        for source in self.sources()? {
            match source {
                SourcePath::Builtin => {
                    debug!("loading bundled core signatures");
                    self.load_text(
                        &mut environment,
                        &mut environment_errors,
                        &mut file_errors,
                        PathBuf::from(BUILTIN_NAME),
                        BUILTIN.to_string(),
                    );
                }
                SourcePath::Library { path, name } => {
                    debug!(library = %name, path = %path.display(), "loading library");
                    self.load_path(
                        &mut environment,
                        &mut environment_errors,
                        &mut file_errors,
                        &path,
                    )?;
                }
                SourcePath::Path(path) => {
                    self.load_path(
                        &mut environment,
                        &mut environment_errors,
                        &mut file_errors,
                        &path,
                    )?;
                }
            }
        }

        if !file_errors.is_empty() {
            return Err(LoadError::Syntax(file_errors));
        }
        Ok((environment, environment_errors))
    }

    fn load_path(
        &self,
        environment: &mut Environment,
        environment_errors: &mut Vec<EnvironmentError>,
        file_errors: &mut Vec<FileErrors>,
        path: &Path,
    ) -> Result<(), LoadError> {
        for file in each_signature(path)? {
            let source = fs::read_to_string(&file).map_err(|error| LoadError::Io {
                path: file.clone(),
                error,
            })?;
            debug!(path = %file.display(), "loading signature file");
            self.load_text(environment, environment_errors, file_errors, file, source);
        }
        Ok(())
    }

    fn load_text(
        &self,
        environment: &mut Environment,
        environment_errors: &mut Vec<EnvironmentError>,
        file_errors: &mut Vec<FileErrors>,
        path: PathBuf,
        source: String,
    ) {
        match parse_signature(&source) {
            Ok(decls) => {
                let buffer = environment.add_buffer(path.display().to_string(), source);
                environment_errors.extend(environment.add(buffer, &decls));
            }
            Err(errors) => file_errors.push(FileErrors {
                path,
                source,
                errors,
            }),
        }
    }

    fn find_library(&self, name: &str) -> Result<PathBuf, LoadError> {
        for root in &self.library_roots {
            let candidate = root.join(name);
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }
        Err(LoadError::LibraryNotFound {
            name: name.to_string(),
        })
    }
}

/// Enumerates the signature files under `path`: the file itself, or every
/// `.sig` file below a directory, sorted for deterministic load order.
pub fn each_signature(path: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    collect_signatures(path, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_signatures(path: &Path, files: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    if path.is_file() {
        files.push(path.to_path_buf());
        return Ok(());
    }
    let entries = fs::read_dir(path).map_err(|error| LoadError::Io {
        path: path.to_path_buf(),
        error,
    })?;
    for entry in entries {
        let entry = entry.map_err(|error| LoadError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let entry_path = entry.path();
        if entry_path.is_dir() {
            collect_signatures(&entry_path, files)?;
        } else if entry_path
            .extension()
            .is_some_and(|ext| ext == SIGNATURE_EXTENSION)
        {
            files.push(entry_path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        let mut file = fs::File::create(&path).expect("create");
        file.write_all(content.as_bytes()).expect("write");
        path
    }

    #[test]
    fn loads_signature_files_from_directories() {
        let dir = tempdir().expect("tempdir");
        write_file(dir.path(), "a.sig", "class A end");
        write_file(dir.path(), "nested/b.sig", "class B end");
        write_file(dir.path(), "ignored.txt", "not a signature");

        let mut loader = EnvironmentLoader::new();
        loader.no_builtin(true);
        loader.add_path(dir.path());
        let (env, errors) = loader.load().expect("load");
        assert!(errors.is_empty());
        assert!(env
            .class_entry(&crate::language::names::TypeName::parse("::A").unwrap())
            .is_some());
        assert!(env
            .class_entry(&crate::language::names::TypeName::parse("::B").unwrap())
            .is_some());
    }

    #[test]
    fn builtin_is_loaded_unless_disabled() {
        let loader = EnvironmentLoader::new();
        let (env, errors) = loader.load().expect("load");
        assert!(errors.is_empty(), "builtin env errors: {:?}", errors);
        assert!(env
            .class_entry(&crate::language::names::TypeName::parse("::Object").unwrap())
            .is_some());

        let mut bare = EnvironmentLoader::new();
        bare.no_builtin(true);
        let (env, _) = bare.load().expect("load");
        assert!(env
            .class_entry(&crate::language::names::TypeName::parse("::Object").unwrap())
            .is_none());
    }

    #[test]
    fn parse_errors_are_collected_per_file() {
        let dir = tempdir().expect("tempdir");
        write_file(dir.path(), "bad.sig", "class { nope");
        let mut loader = EnvironmentLoader::new();
        loader.no_builtin(true);
        loader.add_path(dir.path());
        match loader.load() {
            Err(LoadError::Syntax(files)) => {
                assert_eq!(files.len(), 1);
                assert!(files[0].path.ends_with("bad.sig"));
                assert!(!files[0].errors.errors.is_empty());
            }
            other => panic!("expected syntax errors, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn libraries_resolve_against_roots() {
        let dir = tempdir().expect("tempdir");
        write_file(&dir.path().join("mylib"), "lib.sig", "class FromLib end");

        let mut loader = EnvironmentLoader::new();
        loader.no_builtin(true);
        loader.add_library_root(dir.path());
        loader.add_library("mylib");
        let (env, _) = loader.load().expect("load");
        assert!(env
            .class_entry(&crate::language::names::TypeName::parse("::FromLib").unwrap())
            .is_some());

        let mut missing = EnvironmentLoader::new();
        missing.no_builtin(true);
        missing.add_library("absent");
        assert!(matches!(
            missing.load(),
            Err(LoadError::LibraryNotFound { .. })
        ));
    }
}
