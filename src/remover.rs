use crate::filter::{count_matches, filter_document, ModFilter};
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

const JSON_SUFFIX: &str = ".json";
const INDENT: &[u8] = b"    ";

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

impl RemoveError {
    pub fn stage(&self) -> FailureStage {
        match self {
            RemoveError::Read { .. } => FailureStage::Read,
            RemoveError::Parse { .. } => FailureStage::Parse,
            RemoveError::Serialize { .. } => FailureStage::Serialize,
            RemoveError::Write { .. } => FailureStage::Write,
            RemoveError::Walk { .. } => FailureStage::Walk,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            RemoveError::Read { path, .. }
            | RemoveError::Parse { path, .. }
            | RemoveError::Serialize { path, .. }
            | RemoveError::Write { path, .. }
            | RemoveError::Walk { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Changed { removed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Walk,
    Read,
    Parse,
    Serialize,
    Write,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
    pub stage: FailureStage,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemovalReport {
    pub changed: Vec<PathBuf>,
    pub scanned: usize,
    pub entries_removed: usize,
    pub failures: Vec<FileFailure>,
    pub ignored: Vec<PathBuf>,
    pub dry_run: bool,
}

impl RemovalReport {
    fn record(&mut self, path: &Path, result: Result<FileOutcome, RemoveError>) {
        self.scanned += 1;
        match result {
            Ok(FileOutcome::Changed { removed }) => {
                self.entries_removed += removed;
                self.changed.push(path.to_path_buf());
            }
            Ok(FileOutcome::Unchanged) => {}
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: RemoveError) {
        self.failures.push(FileFailure {
            path: err.path().to_path_buf(),
            error: err.to_string(),
            stage: err.stage(),
        });
    }
}

/// Walks every input and strips the filtered mod from each `.json` file found.
///
/// Directories are searched recursively; a plain `.json` file is handled the
/// same way. Other inputs are skipped. Per-file failures land in the report and
/// never stop the run.
pub fn collect_and_process<I, S>(
    paths: I,
    filter: &ModFilter,
    options: &RemoveOptions,
) -> RemovalReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut report = RemovalReport {
        dry_run: options.dry_run,
        ..RemovalReport::default()
    };

    for raw in paths {
        let path = PathBuf::from(strip_braces(raw.as_ref()));
        if path.is_dir() {
            walk_dir(&path, filter, options, &mut report);
        } else if has_json_suffix(&path) && path.is_file() {
            let result = process_file(&path, filter, options);
            report.record(&path, result);
        } else {
            report.ignored.push(path);
        }
    }

    report
}

fn walk_dir(
    root: &Path,
    filter: &ModFilter,
    options: &RemoveOptions,
    report: &mut RemovalReport,
) {
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                report.fail(RemoveError::Walk { path, source: err });
                continue;
            }
        };
        if entry.file_type().is_dir() || !has_json_suffix(entry.path()) {
            continue;
        }
        if entry.file_type().is_symlink() && !entry.path().is_file() {
            continue;
        }
        let result = process_file(entry.path(), filter, options);
        report.record(entry.path(), result);
    }
}

/// Filters one file and rewrites it when its `RequiredMods` list shrank.
pub fn process_file(
    path: &Path,
    filter: &ModFilter,
    options: &RemoveOptions,
) -> Result<FileOutcome, RemoveError> {
    let raw = fs::read_to_string(path).map_err(|source| RemoveError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_str(&raw).map_err(|source| RemoveError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let removed = count_matches(&document, filter);
    let (document, changed) = filter_document(document, filter);
    if !changed {
        return Ok(FileOutcome::Unchanged);
    }

    if !options.dry_run {
        write_document(path, &document)?;
    }
    Ok(FileOutcome::Changed { removed })
}

/// Overwrites `path` in place with `document`, indented by four spaces.
pub fn write_document(path: &Path, document: &Value) -> Result<(), RemoveError> {
    let raw = to_indented_json(document).map_err(|source| RemoveError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, raw).map_err(|source| RemoveError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn to_indented_json(document: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(INDENT);
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    document.serialize(&mut serializer)?;
    Ok(out)
}

/// Drops one leading `{` and one trailing `}` left over from bracketed drop data.
pub fn strip_braces(raw: &str) -> &str {
    let value = raw.strip_prefix('{').unwrap_or(raw);
    value.strip_suffix('}').unwrap_or(value)
}

fn has_json_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(JSON_SUFFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use serde_json::json;
    use tempfile::tempdir;

    const TWO_MODS: &str = r#"{"RequiredMods":[{"Name":"Alpha","WorkshopId":"1"},{"Name":"Beta","WorkshopId":"2"}]}"#;

    fn by_name(name: &str) -> ModFilter {
        ModFilter::new(Some(name), None).unwrap()
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn age(path: &Path) -> FileTime {
        let old = FileTime::from_unix_time(1_000_000_000, 0);
        set_file_mtime(path, old).unwrap();
        old
    }

    fn mtime(path: &Path) -> FileTime {
        FileTime::from_last_modification_time(&fs::metadata(path).unwrap())
    }

    #[test]
    fn strip_braces_removes_at_most_one_each_side() {
        assert_eq!(strip_braces("{/tmp/a b}"), "/tmp/a b");
        assert_eq!(strip_braces("{{/tmp/x}}"), "{/tmp/x}");
        assert_eq!(strip_braces("{/tmp/x"), "/tmp/x");
        assert_eq!(strip_braces("/tmp/x}"), "/tmp/x");
        assert_eq!(strip_braces("/tmp/x"), "/tmp/x");
        assert_eq!(strip_braces("{}"), "");
    }

    #[test]
    fn removes_matching_entry_from_directory() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.json");
        fs::write(&file, TWO_MODS).unwrap();

        let report = collect_and_process(
            [path_str(temp.path())],
            &by_name("alpha"),
            &RemoveOptions::default(),
        );

        assert_eq!(report.changed, vec![file.clone()]);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.entries_removed, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            read_json(&file),
            json!({"RequiredMods": [{"Name": "Beta", "WorkshopId": "2"}]})
        );
    }

    #[test]
    fn rewrite_uses_four_space_indent() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.json");
        fs::write(&file, TWO_MODS).unwrap();

        collect_and_process([path_str(&file)], &by_name("beta"), &RemoveOptions::default());

        let raw = fs::read_to_string(&file).unwrap();
        let expected = "{\n    \"RequiredMods\": [\n        {\n            \"Name\": \"Alpha\",\n            \"WorkshopId\": \"1\"\n        }\n    ]\n}";
        assert_eq!(raw, expected);
    }

    #[test]
    fn rewrite_keeps_key_order() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("order.json");
        fs::write(
            &file,
            r#"{"Zeta":1,"RequiredMods":[{"Name":"Alpha"}],"Alpha":2}"#,
        )
        .unwrap();

        collect_and_process([path_str(&file)], &by_name("alpha"), &RemoveOptions::default());

        let raw = fs::read_to_string(&file).unwrap();
        let zeta = raw.find("Zeta").unwrap();
        let mods = raw.find("RequiredMods").unwrap();
        let alpha = raw.rfind("Alpha").unwrap();
        assert!(zeta < mods && mods < alpha);
    }

    #[test]
    fn unmatched_file_is_not_rewritten() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.json");
        fs::write(&file, TWO_MODS).unwrap();
        let before = age(&file);

        let filter = ModFilter::new(Some("gamma"), Some("")).unwrap();
        let report = collect_and_process([path_str(temp.path())], &filter, &RemoveOptions::default());

        assert!(report.changed.is_empty());
        assert_eq!(report.scanned, 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), TWO_MODS);
        assert_eq!(mtime(&file), before);
    }

    #[test]
    fn single_file_matches_directory_handling() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("contraption.json");
        fs::write(&file, TWO_MODS).unwrap();

        let report = collect_and_process(
            [path_str(&file)],
            &ModFilter::new(None, Some("2")).unwrap(),
            &RemoveOptions::default(),
        );

        assert_eq!(report.changed, vec![file.clone()]);
        assert_eq!(
            read_json(&file),
            json!({"RequiredMods": [{"Name": "Alpha", "WorkshopId": "1"}]})
        );
    }

    #[test]
    fn braced_input_is_accepted() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.json");
        fs::write(&file, TWO_MODS).unwrap();

        let braced = format!("{{{}}}", path_str(temp.path()));
        let report = collect_and_process([braced], &by_name("alpha"), &RemoveOptions::default());

        assert_eq!(report.changed, vec![file]);
    }

    #[test]
    fn malformed_sibling_does_not_block_valid_file() {
        let temp = tempdir().unwrap();
        let broken = temp.path().join("broken.json");
        let good = temp.path().join("good.json");
        fs::write(&broken, "{\"RequiredMods\": [").unwrap();
        fs::write(&good, TWO_MODS).unwrap();

        let report = collect_and_process(
            [path_str(temp.path())],
            &by_name("alpha"),
            &RemoveOptions::default(),
        );

        assert_eq!(report.changed, vec![good]);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, broken);
        assert!(report.failures[0].error.starts_with("parse "));
        assert_eq!(report.failures[0].stage, FailureStage::Parse);
        assert_eq!(fs::read_to_string(&broken).unwrap(), "{\"RequiredMods\": [");
    }

    #[test]
    fn nested_directories_are_walked() {
        let temp = tempdir().unwrap();
        let deep = temp.path().join("saves/cars/old");
        fs::create_dir_all(&deep).unwrap();
        let top = temp.path().join("top.json");
        let nested = deep.join("truck.json");
        fs::write(&top, TWO_MODS).unwrap();
        fs::write(&nested, TWO_MODS).unwrap();

        let report = collect_and_process(
            [path_str(temp.path())],
            &by_name("beta"),
            &RemoveOptions::default(),
        );

        assert_eq!(report.changed.len(), 2);
        assert!(report.changed.contains(&top));
        assert!(report.changed.contains(&nested));
    }

    #[test]
    fn other_suffixes_are_never_touched() {
        let temp = tempdir().unwrap();
        let upper = temp.path().join("a.JSON");
        let text = temp.path().join("a.json.txt");
        let bare = temp.path().join("json");
        for file in [&upper, &text, &bare] {
            fs::write(file, TWO_MODS).unwrap();
        }
        let stamps: Vec<FileTime> = [&upper, &text, &bare].iter().map(|f| age(f)).collect();

        let report = collect_and_process(
            [path_str(temp.path())],
            &by_name("alpha"),
            &RemoveOptions::default(),
        );

        assert_eq!(report.scanned, 0);
        assert!(report.changed.is_empty());
        for (file, stamp) in [&upper, &text, &bare].iter().zip(stamps) {
            assert_eq!(fs::read_to_string(file).unwrap(), TWO_MODS);
            assert_eq!(mtime(file), stamp);
        }
    }

    #[test]
    fn missing_and_non_json_inputs_are_ignored() {
        let temp = tempdir().unwrap();
        let notes = temp.path().join("notes.txt");
        fs::write(&notes, "hi").unwrap();
        let missing = temp.path().join("gone.json");

        let report = collect_and_process(
            [path_str(&notes), path_str(&missing)],
            &by_name("alpha"),
            &RemoveOptions::default(),
        );

        assert_eq!(report.scanned, 0);
        assert!(report.failures.is_empty());
        assert_eq!(report.ignored, vec![notes, missing]);
    }

    #[test]
    fn second_run_changes_nothing() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.json");
        fs::write(&file, TWO_MODS).unwrap();
        let filter = by_name("alpha");

        let first = collect_and_process([path_str(temp.path())], &filter, &RemoveOptions::default());
        assert_eq!(first.changed.len(), 1);
        let after_first = fs::read_to_string(&file).unwrap();
        let stamp = age(&file);

        let second = collect_and_process([path_str(temp.path())], &filter, &RemoveOptions::default());
        assert!(second.changed.is_empty());
        assert_eq!(fs::read_to_string(&file).unwrap(), after_first);
        assert_eq!(mtime(&file), stamp);
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.json");
        fs::write(&file, TWO_MODS).unwrap();
        let stamp = age(&file);

        let report = collect_and_process(
            [path_str(temp.path())],
            &by_name("alpha"),
            &RemoveOptions { dry_run: true },
        );

        assert!(report.dry_run);
        assert_eq!(report.changed, vec![file.clone()]);
        assert_eq!(report.entries_removed, 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), TWO_MODS);
        assert_eq!(mtime(&file), stamp);
    }

    #[test]
    fn process_file_reports_missing_file_as_read_error() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.json");
        let err = process_file(&missing, &by_name("alpha"), &RemoveOptions::default())
            .unwrap_err();
        assert!(matches!(err, RemoveError::Read { .. }));
        assert_eq!(err.stage(), FailureStage::Read);
        assert_eq!(err.path(), missing.as_path());
    }
}
