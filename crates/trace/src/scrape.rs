//! Scraping `bash -x` output.
//!
//! Trace lines start with one `+` per nesting level (`+`, `++`, `+++` ...).
//! Two things are pulled out of them: variable assignments, kept in
//! first-seen order, and the `exec` hand-off that ends the script.
//!
//! ```text
//! + export HADOOP_LIBEXEC_DIR=//usr/lib/hadoop/libexec
//! ++ HADOOP_CONF_DIR=/etc/hadoop/conf
//! + exec /usr/lib/hadoop/bin/hadoop fs -ls /
//! ```

use once_cell::sync::Lazy;
use patcher_runner::ScriptProbe;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

use crate::error::TraceError;
use crate::exec::ExecEvent;
use crate::vars::VarHistory;

static UPPER_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("upper identifier regex is valid"));
static LOWER_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("lower identifier regex is valid"));

/// Variables and exec hand-offs found in one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedTrace {
    pub vars: VarHistory,
    pub events: Vec<ExecEvent>,
}

/// Scrape both variables and exec events out of trace text.
pub fn scrape(text: &str, probe: &dyn ScriptProbe) -> ScrapedTrace {
    ScrapedTrace {
        vars: scrape_variables(text),
        events: extract_exec_events(text, probe),
    }
}

/// Drop the nesting markers and surrounding whitespace from a trace line.
pub fn strip_trace_prefix(line: &str) -> &str {
    line.trim_start().trim_start_matches('+').trim()
}

/// Literal `exec` lines, in order.
pub fn extract_exec_lines(text: &str) -> Vec<ExecEvent> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_exec_line(idx, line))
        .collect()
}

/// Literal `exec` lines, or, when there are none, the last traced line
/// that invokes an existing script or executable by path.
pub fn extract_exec_events(text: &str, probe: &dyn ScriptProbe) -> Vec<ExecEvent> {
    let events = extract_exec_lines(text);
    if !events.is_empty() {
        return events;
    }

    let fallback = find_last_invocation(text, probe);
    if let Some(event) = &fallback {
        debug!(line = ?event.line, target = %event.target, "no literal exec; using last invocation");
    }
    fallback.into_iter().collect()
}

/// Exec lines written in a script file itself, labelled with that file.
pub fn scan_script_file(path: &Path) -> Result<Vec<ExecEvent>, TraceError> {
    let bytes = fs::read(path).map_err(|e| TraceError::io(path, e))?;
    let origin = path.display().to_string();
    Ok(extract_exec_lines(&String::from_utf8_lossy(&bytes))
        .into_iter()
        .map(|event| event.with_origin(origin.clone()))
        .collect())
}

fn parse_exec_line(idx: usize, line: &str) -> Option<ExecEvent> {
    let stripped = strip_trace_prefix(line);
    let (keyword, mut rest) = next_word(stripped)?;
    if keyword != "exec" {
        return None;
    }

    let mut operands_only = false;
    let target = loop {
        let (word, after) = next_word(rest)?;
        rest = after;
        if operands_only {
            break word;
        }
        match word {
            "-a" => rest = next_word(rest).map_or("", |(_, after)| after),
            "--" => operands_only = true,
            flag if flag.starts_with('-') && flag.len() > 1 => {}
            target => break target,
        }
    };
    if is_redirection(target) {
        trace!(line = idx, "ignoring exec redirection");
        return None;
    }

    let args: Vec<&str> = rest.split_whitespace().collect();
    Some(ExecEvent::new(idx, dequote(target), args.join(" ")))
}

/// Split off the first shell word of `text`. Quoted spans, including any
/// whitespace inside them, stay part of the word.
fn next_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (pos, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some('"'), '"') => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, c) if c.is_whitespace() => return Some((&text[..pos], &text[pos..])),
            (None, _) => {}
        }
    }
    Some((text, ""))
}

/// Remove shell quoting from one word, keeping what the quotes protected.
fn dequote(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut quote: Option<char> = None;
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            (None, '\'' | '"') => quote = Some(c),
            (_, c) => out.push(c),
        }
    }
    out
}

/// `exec >log`, `exec 2>&1`, `exec 3<&-`, `exec &>/dev/null`: fd plumbing,
/// not a hand-off.
fn is_redirection(word: &str) -> bool {
    let without_fd = word.trim_start_matches(|c: char| c.is_ascii_digit());
    without_fd.starts_with('>') || without_fd.starts_with('<') || without_fd.starts_with("&>")
}

fn find_last_invocation(text: &str, probe: &dyn ScriptProbe) -> Option<ExecEvent> {
    let lines: Vec<&str> = text.lines().collect();
    for (idx, line) in lines.iter().enumerate().rev() {
        if !line.trim_start().starts_with('+') {
            continue;
        }
        let Some((first, rest)) = next_word(strip_trace_prefix(line)) else {
            continue;
        };
        let target = dequote(first);
        if !target.contains('/') {
            continue;
        }
        if probe.is_script(&target) || probe.is_executable(&target) {
            let args: Vec<&str> = rest.split_whitespace().collect();
            return Some(ExecEvent::new(idx, target, args.join(" ")));
        }
    }
    None
}

/// Parse one trace line as `NAME=VALUE`, with an optional `export`.
///
/// Whole-assignment quoting (`export 'OPTS=-Xmx1g -server'`) is unwrapped
/// and the value re-quoted so it stays valid shell.
pub fn parse_assignment(line: &str) -> Option<(String, String)> {
    let stripped = strip_trace_prefix(line);
    if stripped.split_whitespace().next() == Some("exec") {
        return None;
    }
    let body = match stripped.strip_prefix("export ") {
        Some(rest) => rest.trim_start(),
        None => stripped,
    };

    let (name, value) = match unwrap_quoted_assignment(body) {
        Some((name, raw)) => (name, format!("'{raw}'")),
        None => {
            let (name, value) = body.split_once('=')?;
            (name, value.to_string())
        }
    };

    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return None;
    }
    if !UPPER_IDENT.is_match(name) && !LOWER_IDENT.is_match(name) {
        return None;
    }
    Some((name.to_string(), value))
}

fn unwrap_quoted_assignment(body: &str) -> Option<(&str, &str)> {
    if body.len() < 2 || !body.starts_with('\'') || !body.ends_with('\'') {
        return None;
    }
    let inner = &body[1..body.len() - 1];
    let (name, raw) = inner.split_once('=')?;
    (!name.contains('\'')).then_some((name, raw))
}

/// Every assignment in the trace, first-seen order, uniform histories
/// collapsed to one value.
pub fn scrape_variables(text: &str) -> VarHistory {
    let mut vars = VarHistory::new();
    for line in text.lines() {
        if let Some((name, value)) = parse_assignment(line) {
            trace!(name = %name, value = %value, "assignment");
            vars.record(&name, value);
        }
    }
    vars.collapse_uniform();
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeProbe {
        scripts: HashSet<String>,
        binaries: HashSet<String>,
    }

    impl ScriptProbe for FakeProbe {
        fn is_script(&self, path: &str) -> bool {
            self.scripts.contains(path)
        }

        fn is_executable(&self, path: &str) -> bool {
            self.scripts.contains(path) || self.binaries.contains(path)
        }
    }

    #[test]
    fn test_strip_trace_prefix() {
        assert_eq!(strip_trace_prefix("+++ export A=1"), "export A=1");
        assert_eq!(strip_trace_prefix("  + B=2  "), "B=2");
        assert_eq!(strip_trace_prefix("plain output"), "plain output");
        assert_eq!(strip_trace_prefix("+ OPTS=-Da=b+c"), "OPTS=-Da=b+c");
    }

    #[test]
    fn test_single_exec_line() {
        let text = "+ export FOO=bar\n+ export FOO=bar\n+ exec /bin/real-tool \"$@\"";
        assert_eq!(
            extract_exec_lines(text),
            vec![ExecEvent::new(2, "/bin/real-tool", "\"$@\"")]
        );
    }

    #[test]
    fn test_exec_args_are_whitespace_normalized() {
        let text = "++ exec   /usr/java/default/bin/java  -Xmx1000m   -Dproc_fs org.apache.hadoop.fs.FsShell -ls /";
        let events = extract_exec_lines(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "/usr/java/default/bin/java");
        assert_eq!(
            events[0].args,
            "-Xmx1000m -Dproc_fs org.apache.hadoop.fs.FsShell -ls /"
        );
    }

    #[test]
    fn test_exec_redirections_and_options() {
        let text = "+ exec 3>&1\n+ exec >/tmp/log\n+ exec 2>/dev/null\n+ exec\n+ exec -a hive /usr/lib/hive/bin/hive -e 'show tables'";
        let events = extract_exec_lines(text);
        assert_eq!(
            events,
            vec![ExecEvent::new(4, "/usr/lib/hive/bin/hive", "-e 'show tables'")]
        );
    }

    #[test]
    fn test_exec_inside_words_is_not_an_exec() {
        let text = "+ echo exec /bin/nope\n+ executor=/bin/x\n+ HADOOP_EXEC=/bin/y";
        assert!(extract_exec_lines(text).is_empty());
    }

    #[test]
    fn test_quoted_exec_target_is_unquoted() {
        let text = "+ exec '/opt/with space/bin/tool' a";
        assert_eq!(
            extract_exec_lines(text),
            vec![ExecEvent::new(0, "/opt/with space/bin/tool", "a")]
        );
    }

    #[test]
    fn test_exec_target_quoting_forms() {
        let text = "\
exec \"$HADOOP_HOME/bin/hadoop\" \"$@\"
+ exec -- \"/opt/my tools/hive\" -e 'show tables'
+ exec /opt/split\\ dir/yarn";
        let events = extract_exec_lines(text);
        let targets: Vec<&str> = events.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(
            targets,
            ["$HADOOP_HOME/bin/hadoop", "/opt/my tools/hive", "/opt/split dir/yarn"]
        );
        assert_eq!(events[1].args, "-e 'show tables'");
    }

    #[test]
    fn test_fallback_keeps_quoted_target_whole() {
        let probe = FakeProbe {
            binaries: HashSet::from(["/opt/my tools/bin/tool".to_string()]),
            ..Default::default()
        };
        let events = extract_exec_events("+ '/opt/my tools/bin/tool' run now", &probe);
        assert_eq!(events, vec![ExecEvent::new(0, "/opt/my tools/bin/tool", "run now")]);
    }

    #[test]
    fn test_fallback_scans_backwards_for_last_invocation() {
        let probe = FakeProbe {
            scripts: HashSet::from(["/usr/lib/hive/bin/ext/cli.sh".to_string()]),
            binaries: HashSet::from(["/usr/java/default/bin/java".to_string()]),
        };
        let text = "\
+ HIVE_HOME=/usr/lib/hive
++ /usr/lib/hive/bin/ext/cli.sh --service cli
+++ /usr/java/default/bin/java -cp /usr/lib/hive/lib/* org.apache.hadoop.hive.cli.CliDriver
+++ dirname /x
OK
/usr/lib/hive/bin/ext/cli.sh is mentioned in output";

        let events = extract_exec_events(text, &probe);
        assert_eq!(
            events,
            vec![ExecEvent::new(
                2,
                "/usr/java/default/bin/java",
                "-cp /usr/lib/hive/lib/* org.apache.hadoop.hive.cli.CliDriver"
            )]
        );
    }

    #[test]
    fn test_fallback_is_not_used_when_exec_exists() {
        let probe = FakeProbe {
            scripts: HashSet::from(["/usr/lib/spark/bin/spark-class".to_string()]),
            ..Default::default()
        };
        let text = "+ exec /usr/lib/spark/bin/spark-submit --version\n+ /usr/lib/spark/bin/spark-class x";
        let events = extract_exec_events(text, &probe);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "/usr/lib/spark/bin/spark-submit");
    }

    #[test]
    fn test_fallback_finds_nothing() {
        let probe = FakeProbe::default();
        assert!(extract_exec_events("+ echo hi\n+ /not/known arg", &probe).is_empty());
    }

    #[test]
    fn test_parse_assignment_forms() {
        assert_eq!(
            parse_assignment("+ export HADOOP_LIBEXEC_DIR=///usr/lib/hadoop/libexec"),
            Some(("HADOOP_LIBEXEC_DIR".into(), "///usr/lib/hadoop/libexec".into()))
        );
        assert_eq!(
            parse_assignment("++ bin=/usr/lib/hadoop/bin"),
            Some(("bin".into(), "/usr/lib/hadoop/bin".into()))
        );
        assert_eq!(
            parse_assignment("+ HADOOP_OPTS=-Dfoo=bar"),
            Some(("HADOOP_OPTS".into(), "-Dfoo=bar".into()))
        );
        assert_eq!(parse_assignment("+ EMPTY="), Some(("EMPTY".into(), String::new())));
    }

    #[test]
    fn test_parse_assignment_rejects_non_assignments() {
        for line in [
            "+ '[' x = y ']'",
            "+ [[ -n foo == bar ]]",
            "+ local opts=1",
            "+ exec /bin/java -Dx=y",
            "+ echo done",
            "+ mixedCase=1",
            "+ COUNT+=1",
            "+ =value",
            "+ ARR[0]=x",
        ] {
            assert_eq!(parse_assignment(line), None, "{line}");
        }
    }

    #[test]
    fn test_parse_quoted_export() {
        assert_eq!(
            parse_assignment("+ export 'HADOOP_CLIENT_OPTS=-Xmx512m -server'"),
            Some(("HADOOP_CLIENT_OPTS".into(), "'-Xmx512m -server'".into()))
        );
        assert_eq!(
            parse_assignment(r"+ export 'MSG=it'\''s'"),
            Some(("MSG".into(), r"'it'\''s'".into()))
        );
    }

    #[test]
    fn test_scrape_variables_collapses_and_orders() {
        let text = "\
+ export FOO=bar
+ export COUNT=1
+ export FOO=bar
+ export COUNT=2
+ JAVA_CANDIDATES=('/usr/java/jdk8' '/usr/java/jdk7')";
        let vars = scrape_variables(text);

        assert_eq!(vars.names().collect::<Vec<_>>(), ["FOO", "COUNT", "JAVA_CANDIDATES"]);
        assert_eq!(vars.get("FOO").unwrap().values(), ["bar"]);
        assert_eq!(vars.get("COUNT").unwrap().values(), ["1", "2"]);
        assert!(vars.get("JAVA_CANDIDATES").unwrap().is_array());
    }

    #[test]
    fn test_scan_script_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("hadoop");
        fs::write(
            &script,
            "#!/bin/bash\nexport HADOOP_LIBEXEC_DIR=//usr/lib/hadoop/libexec\n\nexec /usr/lib/hadoop/bin/hadoop \"$@\"\n",
        )
        .unwrap();

        let events = scan_script_file(&script).unwrap();
        let origin = script.display().to_string();
        assert_eq!(
            events,
            vec![ExecEvent::new(3, "/usr/lib/hadoop/bin/hadoop", "\"$@\"").with_origin(origin)]
        );
    }

    #[test]
    fn test_scan_missing_file_is_io_error() {
        let err = scan_script_file(Path::new("/no/such/script")).unwrap_err();
        assert!(matches!(err, TraceError::Io { .. }));
    }
}
