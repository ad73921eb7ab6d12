use patcher_runner::{shell_quote, which, CommandRunner, RunOptions};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{JarError, SignatureMap};

/// Runs `jar` and `javap` to collect class signatures.
pub struct JarDumper<R> {
    runner: R,
    jar_tool: PathBuf,
    javap_tool: PathBuf,
}

impl<R: CommandRunner> JarDumper<R> {
    pub fn new(runner: R, jar_tool: impl Into<PathBuf>, javap_tool: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            jar_tool: jar_tool.into(),
            javap_tool: javap_tool.into(),
        }
    }

    /// Resolve `jar` and `javap` on `PATH`.
    pub fn locate(runner: R) -> Result<Self, JarError> {
        let find = |tool: &str| {
            which(tool).ok_or_else(|| JarError::ToolNotFound {
                tool: tool.to_string(),
            })
        };
        let jar_tool = find("jar")?;
        let javap_tool = find("javap")?;
        debug!(jar = %jar_tool.display(), javap = %javap_tool.display(), "located JDK tools");
        Ok(Self::new(runner, jar_tool, javap_tool))
    }

    /// Archive entry names, blank lines dropped.
    pub fn list_entries(&self, jar: &Path) -> Result<Vec<String>, JarError> {
        let command = format!(
            "{} tf {}",
            shell_quote(&self.jar_tool.display().to_string()),
            shell_quote(&jar.display().to_string())
        );
        let output = self.runner.run(&command, &RunOptions::captured())?;
        if !output.success() {
            return Err(JarError::ToolFailed {
                command,
                exit_code: output.exit_code,
                output: output.output.trim().to_string(),
            });
        }
        Ok(output
            .output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// `javap` stdout for every `.class` entry of `jar`. Stderr is discarded
    /// so JVM notices such as `Picked up JAVA_TOOL_OPTIONS` stay out of the
    /// signatures.
    pub fn dump(&self, jar: &Path) -> Result<SignatureMap, JarError> {
        let jar_arg = shell_quote(&jar.display().to_string());
        let javap = shell_quote(&self.javap_tool.display().to_string());
        let mut signatures = SignatureMap::new();

        for entry in self.list_entries(jar)? {
            let Some(class) = entry.strip_suffix(".class") else {
                continue;
            };
            let command = format!(
                "{javap} -classpath {jar_arg} {} 2>/dev/null",
                shell_quote(class)
            );
            let output = self.runner.run(&command, &RunOptions::captured())?;
            if !output.success() {
                warn!(entry = %entry, exit_code = output.exit_code, "javap failed; keeping its output");
            }
            debug!(entry = %entry, "dumped");
            signatures.insert(entry, output.output);
        }

        info!(jar = %jar.display(), classes = signatures.len(), "dumped jar signatures");
        Ok(signatures)
    }
}

/// `<jar basename without .jar>.data`, in the current directory.
pub fn default_output_path(jar: &Path) -> PathBuf {
    let name = jar
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jar".to_string());
    let stem = name.strip_suffix(".jar").unwrap_or(&name);
    PathBuf::from(format!("{stem}.data"))
}

/// Write `signatures` as pretty JSON, replacing `path` atomically.
pub fn write_signatures(signatures: &SignatureMap, path: &Path) -> Result<(), JarError> {
    let io_err = |source| JarError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = serde_json::to_string_pretty(signatures).map_err(|source| JarError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_err)?;
    let mut file = NamedTempFile::new_in(&dir).map_err(io_err)?;
    file.write_all(text.as_bytes()).map_err(io_err)?;
    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use patcher_runner::{CommandOutput, ProcessError};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Answers `jar tf` with a fixed listing and `javap` with a canned
    /// signature per class. Like a JVM started with `JAVA_TOOL_OPTIONS`, it
    /// prints a notice on stderr unless the command discards stderr.
    struct FakeJdk {
        entries: &'static str,
        commands: RefCell<Vec<String>>,
    }

    const JVM_NOTICE: &str = "Picked up JAVA_TOOL_OPTIONS: -Dfile.encoding=UTF8\n";

    impl CommandRunner for FakeJdk {
        fn run(&self, command: &str, _options: &RunOptions) -> Result<CommandOutput, ProcessError> {
            self.commands.borrow_mut().push(command.to_string());
            let output = if command.contains(" tf ") {
                self.entries.to_string()
            } else {
                let (args, stderr) = match command.strip_suffix(" 2>/dev/null") {
                    Some(args) => (args, ""),
                    None => (command, JVM_NOTICE),
                };
                let class = args.rsplit(' ').next().unwrap_or_default();
                format!("{stderr}public class {}\n", class.trim_matches('\''))
            };
            Ok(CommandOutput {
                exit_code: 0,
                output,
                timed_out: false,
            })
        }
    }

    fn fake(entries: &'static str) -> JarDumper<FakeJdk> {
        JarDumper::new(
            FakeJdk {
                entries,
                commands: RefCell::new(Vec::new()),
            },
            "/usr/bin/jar",
            "/usr/bin/javap",
        )
    }

    #[test]
    fn test_dump_only_class_entries() {
        let dumper = fake(
            "META-INF/\nMETA-INF/MANIFEST.MF\n\norg/example/Foo.class\norg/example/Foo$Inner.class\n",
        );
        let signatures = dumper.dump(Path::new("/jars/foo-1.0.jar")).unwrap();

        let keys: Vec<&str> = signatures.keys().map(String::as_str).collect();
        assert_eq!(keys, ["org/example/Foo$Inner.class", "org/example/Foo.class"]);
        assert_eq!(signatures["org/example/Foo.class"], "public class org/example/Foo\n");

        let commands = dumper.runner.commands.borrow();
        assert_eq!(commands[0], "/usr/bin/jar tf /jars/foo-1.0.jar");
        assert!(commands
            .contains(&"/usr/bin/javap -classpath /jars/foo-1.0.jar 'org/example/Foo$Inner' 2>/dev/null".to_string()));
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn test_jvm_notices_stay_out_of_signatures() {
        let dumper = fake("org/example/Bar.class\n");
        let signatures = dumper.dump(Path::new("/jars/bar.jar")).unwrap();

        assert_eq!(signatures["org/example/Bar.class"], "public class org/example/Bar\n");
        assert!(signatures.values().all(|sig| !sig.contains("Picked up")));
    }

    #[test]
    fn test_failed_listing_is_an_error() {
        struct Broken;
        impl CommandRunner for Broken {
            fn run(&self, _: &str, _: &RunOptions) -> Result<CommandOutput, ProcessError> {
                Ok(CommandOutput {
                    exit_code: 1,
                    output: "java.util.zip.ZipException: zip END header not found\n".into(),
                    timed_out: false,
                })
            }
        }
        let dumper = JarDumper::new(Broken, "jar", "javap");
        let err = dumper.list_entries(Path::new("bad.jar")).unwrap_err();
        assert!(matches!(err, JarError::ToolFailed { exit_code: 1, .. }));
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/home/me/jars/commons-io-2.4.jar")),
            PathBuf::from("commons-io-2.4.data")
        );
        assert_eq!(default_output_path(Path::new("classes.zip")), PathBuf::from("classes.zip.data"));
    }

    #[test]
    fn test_write_signatures_pretty_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.data");
        let mut signatures = SignatureMap::new();
        signatures.insert("A.class".into(), "class A\n".into());

        write_signatures(&signatures, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"A.class\": \"class A\\n\"\n}");
    }
}
