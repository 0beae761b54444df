//! File content reconciliation: whole files and single lines.

use crate::directory::ensure_path;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::permissions::apply_permissions;
use crate::template::TemplateEngines;
use crate::trigger::{Gate, impl_gated};
use crate::types::Permissions;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

/// Ensure a file has exactly some content.
///
/// Exactly one content source must be set: `data`, `bytes`, `src_path`,
/// `template`, `template_path`, `json` or `yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct File {
    /// Destination. A trailing `/` with `src_path` appends the source's
    /// file name.
    pub path: PathBuf,
    /// Literal text
    pub data: Option<String>,
    /// Literal bytes
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
    /// Copy this file's content
    pub src_path: Option<PathBuf>,
    /// Inline template text
    pub template: Option<String>,
    /// Template read from this file
    pub template_path: Option<PathBuf>,
    /// Engine for `template` / `template_path`; the context default if unset
    pub engine: Option<String>,
    /// Template parameters
    #[serde(default)]
    pub params: Value,
    /// Serialize as pretty JSON (sorted keys, four-space indent)
    pub json: Option<Value>,
    /// Serialize as YAML
    pub yaml: Option<Value>,
    /// Owner, group and mode
    #[serde(flatten)]
    pub permissions: Permissions,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(File);

impl File {
    /// Request a file at `path`. Pick a content source next.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Literal text content.
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Literal byte content.
    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.bytes = Some(bytes.into());
        self
    }

    /// Copy content from another file.
    pub fn copy_from(mut self, src: impl Into<PathBuf>) -> Self {
        self.src_path = Some(src.into());
        self
    }

    /// Render inline template text.
    pub fn template(mut self, template: impl Into<String>, params: Value) -> Self {
        self.template = Some(template.into());
        self.params = params;
        self
    }

    /// Render a template file.
    pub fn template_file(mut self, path: impl Into<PathBuf>, params: Value) -> Self {
        self.template_path = Some(path.into());
        self.params = params;
        self
    }

    /// Use a specific template engine.
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Pretty-printed JSON content.
    pub fn json(mut self, value: Value) -> Self {
        self.json = Some(value);
        self
    }

    /// YAML content.
    pub fn yaml(mut self, value: Value) -> Self {
        self.yaml = Some(value);
        self
    }

    /// Set owner, group and mode.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Where the content actually goes.
    pub fn destination(&self) -> PathBuf {
        let ends_with_separator = self.path.as_os_str().to_string_lossy().ends_with('/');
        match (&self.src_path, ends_with_separator) {
            (Some(src), true) => match src.file_name() {
                Some(name) => self.path.join(name),
                None => self.path.clone(),
            },
            _ => self.path.clone(),
        }
    }

    fn source_count(&self) -> usize {
        [
            self.data.is_some(),
            self.bytes.is_some(),
            self.src_path.is_some(),
            self.template.is_some(),
            self.template_path.is_some(),
            self.json.is_some(),
            self.yaml.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Compute the bytes this file should hold.
    pub fn desired_bytes(&self, host: &dyn Host, engines: &TemplateEngines) -> Result<Vec<u8>> {
        match self.source_count() {
            0 => {
                return Err(Error::invalid(format!(
                    "file {}: no content source given",
                    self.path.display()
                )));
            }
            1 => {}
            n => {
                return Err(Error::invalid(format!(
                    "file {}: {n} content sources given, expected exactly one",
                    self.path.display()
                )));
            }
        }

        if let Some(data) = &self.data {
            return Ok(data.clone().into_bytes());
        }
        if let Some(bytes) = &self.bytes {
            return Ok(bytes.clone());
        }
        if let Some(src) = &self.src_path {
            return host.read(src);
        }
        if let Some(value) = &self.json {
            return Ok(render_json(value)?.into_bytes());
        }
        if let Some(value) = &self.yaml {
            return serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| Error::invalid(format!("yaml for {}: {e}", self.path.display())));
        }

        let template = match (&self.template, &self.template_path) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => String::from_utf8(host.read(path)?).map_err(|_| {
                Error::invalid(format!("template {} is not valid UTF-8", path.display()))
            })?,
            (None, None) => return Err(Error::invalid("no template given")),
        };
        let params = match &self.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        engines
            .render(self.engine.as_deref(), &template, &params)
            .map(String::into_bytes)
    }
}

/// Pretty JSON with sorted keys, four-space indent and a trailing newline.
pub fn render_json(value: &Value) -> Result<String> {
    use serde::Serialize;

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    let mut text = String::from_utf8(out).map_err(|e| Error::invalid(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Apply a [`File`] request (ignoring its gate).
pub fn reconcile_file(host: &dyn Host, engines: &TemplateEngines, request: &File) -> Result<bool> {
    let desired = request.desired_bytes(host, engines)?;
    let dest = request.destination();

    let created = match host.stat(&dest)? {
        Some(stat) if stat.is_dir() => {
            return Err(Error::conflict(&dest, "is a directory"));
        }
        Some(_) => false,
        None => {
            if let Some(parent) = dest.parent() {
                ensure_path(host, parent)?;
            }
            host.write(&dest, b"")?;
            true
        }
    };

    let perms_changed = apply_permissions(host, &dest, &request.permissions)?;

    let content_changed = host.read(&dest)? != desired;
    if content_changed {
        log::info!("writing {} ({} bytes)", dest.display(), desired.len());
        host.write(&dest, &desired)?;
    } else if !created && !perms_changed {
        log::debug!("file {} already up to date", dest.display());
    }

    Ok(created || perms_changed || content_changed)
}

/// Whether a line should be in the file or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineState {
    /// Line must be present
    #[default]
    Present,
    /// Line must be absent
    Absent,
}

/// Where a new line goes when nothing matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertAt {
    /// After the last line
    #[default]
    #[serde(alias = "bottom")]
    End,
    /// Before the first line
    #[serde(alias = "top")]
    Start,
}

/// Ensure a single line is (or is not) in an existing file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineInFile {
    /// File to edit; must already exist
    pub path: PathBuf,
    /// The exact line
    pub line: Option<String>,
    /// Regex selecting the line to replace or remove
    #[serde(alias = "regexp")]
    pub pattern: Option<String>,
    /// Present or absent
    #[serde(default)]
    pub state: LineState,
    /// Where to insert when nothing matches
    #[serde(default, alias = "new_position")]
    pub insert_at: InsertAt,
    /// Make sure the file ends with a newline
    #[serde(default = "default_true")]
    pub enforce_trailing_newline: bool,
    /// Owner, group and mode
    #[serde(flatten)]
    pub permissions: Permissions,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

fn default_true() -> bool {
    true
}

impl Default for LineInFile {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            line: None,
            pattern: None,
            state: LineState::Present,
            insert_at: InsertAt::End,
            enforce_trailing_newline: true,
            permissions: Permissions::default(),
            gate: Gate::default(),
        }
    }
}

impl_gated!(LineInFile);

impl LineInFile {
    /// Ensure `line` is present in `path`.
    pub fn present(path: impl Into<PathBuf>, line: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: Some(line.into()),
            ..Self::default()
        }
    }

    /// Ensure `line` is absent from `path`.
    pub fn absent(path: impl Into<PathBuf>, line: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: Some(line.into()),
            state: LineState::Absent,
            ..Self::default()
        }
    }

    /// Remove the last line matching `pattern`.
    pub fn absent_matching(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pattern: Some(pattern.into()),
            state: LineState::Absent,
            ..Self::default()
        }
    }

    /// Replace the last line matching `pattern` instead of appending.
    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Insert at the start or end when nothing matches.
    pub fn insert_at(mut self, at: InsertAt) -> Self {
        self.insert_at = at;
        self
    }

    /// Leave a missing final newline alone.
    pub fn keep_trailing_newline_as_is(mut self) -> Self {
        self.enforce_trailing_newline = false;
        self
    }

    /// Set owner, group and mode.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    fn validate(&self) -> Result<Option<Regex>> {
        match self.state {
            LineState::Present if self.line.is_none() => {
                return Err(Error::invalid("line_in_file: state present requires line"));
            }
            LineState::Absent if self.line.is_some() == self.pattern.is_some() => {
                return Err(Error::invalid(
                    "line_in_file: state absent requires exactly one of line and pattern",
                ));
            }
            _ => {}
        }
        self.pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::invalid(format!("line_in_file: bad pattern: {e}")))
    }

    /// The new file text given the current text.
    pub fn edit(&self, current: &str) -> Result<String> {
        let regex = self.validate()?;
        let mut lines: Vec<&str> = current.split('\n').collect();

        let by_pattern = regex
            .as_ref()
            .and_then(|re| lines.iter().rposition(|l| re.is_match(l)));
        let target = by_pattern.or_else(|| {
            self.line
                .as_deref()
                .and_then(|wanted| lines.iter().rposition(|l| *l == wanted))
        });

        match (self.state, target) {
            (LineState::Present, found) => {
                let line = self.line.as_deref().unwrap_or_default();
                match (found, self.insert_at) {
                    (Some(ix), _) => lines[ix] = line,
                    (None, InsertAt::Start) => lines.insert(0, line),
                    (None, InsertAt::End) => {
                        // Keep the empty segment a final newline leaves behind last
                        let ix = if lines.last() == Some(&"") {
                            lines.len() - 1
                        } else {
                            lines.len()
                        };
                        lines.insert(ix, line);
                    }
                }
            }
            (LineState::Absent, Some(ix)) => {
                lines.remove(ix);
            }
            (LineState::Absent, None) => {}
        }

        let mut text = lines.join("\n");
        if self.enforce_trailing_newline && !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}

/// Apply a [`LineInFile`] request (ignoring its gate).
pub fn reconcile_line(
    host: &dyn Host,
    engines: &TemplateEngines,
    request: &LineInFile,
) -> Result<bool> {
    match host.stat(&request.path)? {
        Some(stat) if stat.is_file() => {}
        _ => {
            return Err(Error::NotFound {
                path: request.path.clone(),
            });
        }
    }
    let raw = host.read(&request.path)?;
    let current = String::from_utf8(raw).map_err(|_| {
        Error::invalid(format!("{} is not valid UTF-8", request.path.display()))
    })?;
    let text = request.edit(&current)?;
    let file = File::new(&request.path)
        .data(text)
        .permissions(request.permissions.clone());
    reconcile_file(host, engines, &file)
}

/// Parameters as a JSON object, for template rendering from Rust callers.
pub fn params(pairs: &[(&str, Value)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, SystemHost};
    use serde_json::json;

    fn engines() -> TemplateEngines {
        TemplateEngines::new()
    }

    #[test]
    fn test_file_round_trip() {
        let host = MemoryHost::new();
        let request = File::new("/tmp/file-tests/src-data-test").data("blah");
        assert!(reconcile_file(&host, &engines(), &request).unwrap());
        assert!(!reconcile_file(&host, &engines(), &request).unwrap());
        assert_eq!(host.file_string("/tmp/file-tests/src-data-test").unwrap(), "blah");
    }

    #[test]
    fn test_file_through_symlink_settles() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("target.conf");
        let link = dir.path().join("app.conf");
        std::fs::write(&target, "old").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let host = SystemHost::new();

        let request = File::new(&link)
            .data("x")
            .permissions(Permissions::none().mode(0o600));
        assert!(reconcile_file(&host, &engines(), &request).unwrap());
        assert!(!reconcile_file(&host, &engines(), &request).unwrap());

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "x");
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o600);
    }

    #[test]
    fn test_file_content_change_detected() {
        let host = MemoryHost::new().with_file("/etc/motd", "old\n");
        assert!(reconcile_file(&host, &engines(), &File::new("/etc/motd").data("new\n")).unwrap());
        assert_eq!(host.file_string("/etc/motd").unwrap(), "new\n");
    }

    #[test]
    fn test_file_permission_only_change() {
        let host = MemoryHost::new().with_file("/etc/secret", "s");
        let request = File::new("/etc/secret")
            .data("s")
            .permissions(Permissions::none().mode(0o600));
        assert!(reconcile_file(&host, &engines(), &request).unwrap());
        assert_eq!(host.entry("/etc/secret").unwrap().mode, 0o600);
        assert!(!reconcile_file(&host, &engines(), &request).unwrap());
    }

    #[test]
    fn test_copy_into_directory_appends_name() {
        let host = MemoryHost::new().with_file("/src/app.conf", "conf");
        let request = File::new("/etc/app/").copy_from("/src/app.conf");
        assert_eq!(request.destination(), PathBuf::from("/etc/app/app.conf"));
        assert!(reconcile_file(&host, &engines(), &request).unwrap());
        assert_eq!(host.file_string("/etc/app/app.conf").unwrap(), "conf");
    }

    #[test]
    fn test_directory_at_destination() {
        let host = MemoryHost::new().with_dir("/etc/app");
        let err = reconcile_file(&host, &engines(), &File::new("/etc/app").data("x")).unwrap_err();
        assert!(matches!(err, Error::PathConflict { .. }));
    }

    #[test]
    fn test_source_count_enforced() {
        let host = MemoryHost::new();
        let none = File::new("/x");
        assert!(matches!(
            reconcile_file(&host, &engines(), &none),
            Err(Error::InvalidArgument(_))
        ));
        let two = File::new("/x").data("a").json(json!({}));
        assert!(matches!(
            reconcile_file(&host, &engines(), &two),
            Err(Error::InvalidArgument(_))
        ));
        assert!(host.entry("/x").is_none());
    }

    #[test]
    fn test_template_rendering() {
        let host = MemoryHost::new();
        let request = File::new("/etc/greeting")
            .template("hi {{ who }}\n", params(&[("who", json!("carl"))]));
        reconcile_file(&host, &engines(), &request).unwrap();
        assert_eq!(host.file_string("/etc/greeting").unwrap(), "hi carl");
    }

    #[test]
    fn test_template_file_rendering() {
        let host = MemoryHost::new().with_file("/tpl/conf.j2", "port={{ port }}");
        let request =
            File::new("/etc/conf").template_file("/tpl/conf.j2", json!({"port": 8500}));
        reconcile_file(&host, &engines(), &request).unwrap();
        assert_eq!(host.file_string("/etc/conf").unwrap(), "port=8500");
    }

    #[test]
    fn test_render_failure_leaves_no_file() {
        let host = MemoryHost::new();
        let request = File::new("/etc/bad").template("{% if %}", Value::Null);
        assert!(matches!(
            reconcile_file(&host, &engines(), &request),
            Err(Error::Render(_))
        ));
        assert!(host.entry("/etc/bad").is_none());
    }

    #[test]
    fn test_json_is_sorted_and_indented() {
        let text = render_json(&json!({"b": 1, "a": {"c": [1, 2]}})).unwrap();
        assert_eq!(
            text,
            "{\n    \"a\": {\n        \"c\": [\n            1,\n            2\n        ]\n    },\n    \"b\": 1\n}\n"
        );
    }

    #[test]
    fn test_yaml_content() {
        let host = MemoryHost::new();
        reconcile_file(&host, &engines(), &File::new("/etc/x.yml").yaml(json!({"a": 1}))).unwrap();
        assert_eq!(host.file_string("/etc/x.yml").unwrap(), "a: 1\n");
    }

    #[test]
    fn test_line_appended_before_trailing_newline() {
        let edit = LineInFile::present("/f", "c").edit("a\nb\n").unwrap();
        assert_eq!(edit, "a\nb\nc\n");
    }

    #[test]
    fn test_line_appended_to_file_without_newline() {
        let edit = LineInFile::present("/f", "blah").edit("asdf").unwrap();
        assert_eq!(edit, "asdf\nblah\n");
    }

    #[test]
    fn test_line_inserted_at_start() {
        let edit = LineInFile::present("/f", "z")
            .insert_at(InsertAt::Start)
            .edit("a\n")
            .unwrap();
        assert_eq!(edit, "z\na\n");
    }

    #[test]
    fn test_line_into_empty_file() {
        assert_eq!(LineInFile::present("/f", "x").edit("").unwrap(), "x\n");
    }

    #[test]
    fn test_line_replaces_last_pattern_match() {
        let edit = LineInFile::present("/f", "PermitRootLogin no")
            .matching("^#?PermitRootLogin")
            .edit("PermitRootLogin yes\nX\n#PermitRootLogin maybe\n")
            .unwrap();
        assert_eq!(edit, "PermitRootLogin yes\nX\nPermitRootLogin no\n");
    }

    #[test]
    fn test_line_absent_by_pattern() {
        let edit = LineInFile::absent_matching("/f", "^b")
            .edit("a\nb1\nc\nb2\n")
            .unwrap();
        assert_eq!(edit, "a\nb1\nc\n");
    }

    #[test]
    fn test_line_absent_removes_only_line() {
        let edit = LineInFile::absent_matching("/f", "^as").edit("asdf\n").unwrap();
        assert_eq!(edit, "\n");
    }

    #[test]
    fn test_line_absent_exact_when_missing_is_noop() {
        assert_eq!(LineInFile::absent("/f", "q").edit("a\n").unwrap(), "a\n");
    }

    #[test]
    fn test_trailing_newline_not_enforced() {
        let edit = LineInFile::absent("/f", "b")
            .keep_trailing_newline_as_is()
            .edit("a\nb")
            .unwrap();
        assert_eq!(edit, "a");
    }

    #[test]
    fn test_line_argument_validation() {
        let mut request = LineInFile::present("/f", "x");
        request.line = None;
        assert!(request.edit("").is_err());

        let both = LineInFile::absent("/f", "x").matching("x");
        assert!(both.edit("").is_err());

        let bad_regex = LineInFile::present("/f", "x").matching("(");
        assert!(matches!(bad_regex.edit(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_reconcile_line_idempotent() {
        let host = MemoryHost::new().with_file("/etc/hosts", "127.0.0.1 localhost\n");
        let request = LineInFile::present("/etc/hosts", "10.0.0.5 consul");
        assert!(reconcile_line(&host, &engines(), &request).unwrap());
        assert!(!reconcile_line(&host, &engines(), &request).unwrap());
        assert_eq!(
            host.file_string("/etc/hosts").unwrap(),
            "127.0.0.1 localhost\n10.0.0.5 consul\n"
        );
    }

    #[test]
    fn test_reconcile_line_missing_file() {
        let host = MemoryHost::new();
        let err = reconcile_line(&host, &engines(), &LineInFile::present("/nope", "x")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_reconcile_line_rejects_binary() {
        let host = MemoryHost::new().with_file("/bin/blob", vec![0xff, 0xfe]);
        let err = reconcile_line(&host, &engines(), &LineInFile::present("/bin/blob", "x")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_line_in_file_from_json_aliases() {
        let request: LineInFile = serde_json::from_value(json!({
            "path": "/f", "line": "x", "regexp": "^x", "new_position": "top", "mode": "0644"
        }))
        .unwrap();
        assert_eq!(request.pattern.as_deref(), Some("^x"));
        assert_eq!(request.insert_at, InsertAt::Start);
        assert!(request.enforce_trailing_newline);
        assert_eq!(request.permissions.mode, Some(0o644));
    }
}
