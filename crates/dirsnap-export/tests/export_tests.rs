use std::fs;
use std::path::Path;

use dirsnap_core::{ScanOptions, SnappedFolder};
use dirsnap_export::{
    ExportError, SnapshotGenerator, SnapshotOutcome, SnapshotSerializer, Template,
};
use dirsnap_scan::{NoProgress, ScanPhase, ScanProgress, SnapshotScanner};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn create_test_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    for dir in ["docs", "docs/old", "src", "src/bin", "My Folder", "My.Folder", "MyFolder"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    fs::write(root.join("readme.txt"), "hello").unwrap();
    fs::write(root.join("docs/guide.md"), "# guide").unwrap();
    fs::write(root.join("docs/old/notes.txt"), "n").unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("src/bin/tool.rs"), "").unwrap();
    temp
}

fn render(root: &Path, options: ScanOptions) -> (SnapshotOutcome, String) {
    let template = Template::parse("[DIR DATA]").unwrap();
    let generator = SnapshotGenerator::new(ScanOptions { root: root.to_path_buf(), ..options }, template);
    let mut sink = Vec::new();
    let out = &mut sink;
    let outcome = generator
        .generate(move || Ok(out), &NoProgress, &CancellationToken::new())
        .unwrap();
    (outcome, String::from_utf8(sink).unwrap())
}

/// Child index lists of every record, parsed back from the output.
fn child_lists(text: &str) -> Vec<Vec<usize>> {
    text.lines()
        .map(|line| {
            let body = line.trim_start_matches("D.p([").trim_end_matches("])");
            let last = body.rsplit(',').next().unwrap().trim_matches('"');
            if last.is_empty() {
                Vec::new()
            } else {
                last.split('*').map(|i| i.parse().unwrap()).collect()
            }
        })
        .collect()
}

#[test]
fn test_record_count_matches_total_dirs() {
    let temp = create_test_tree();
    let (outcome, text) = render(temp.path(), ScanOptions::default());

    let SnapshotOutcome::Completed(summary) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(summary.folders, 8);
    assert_eq!(text.lines().count() as u64, summary.folders);
    assert!(text.lines().all(|l| l.starts_with("D.p([") && l.ends_with("])")));
}

#[test]
fn test_child_indices_are_in_range_and_complete() {
    let temp = create_test_tree();
    let (_, text) = render(temp.path(), ScanOptions::default());

    let lists = child_lists(&text);
    let total = lists.len();
    assert!(lists.iter().flatten().all(|&i| i < total));

    // Every folder except the root is referenced exactly once.
    let mut referenced: Vec<usize> = lists.iter().flatten().copied().collect();
    referenced.sort_unstable();
    assert_eq!(referenced, (1..total).collect::<Vec<_>>());
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let temp = create_test_tree();
    let mut options = ScanOptions::default();
    options.enable_hashing = true;

    let (_, first) = render(temp.path(), options.clone());
    let (_, second) = render(temp.path(), options);
    assert_eq!(first, second);
}

#[test]
fn test_hash_column_populated_when_enabled() {
    let temp = create_test_tree();
    let mut options = ScanOptions::default();
    options.enable_hashing = true;
    let (_, text) = render(temp.path(), options);

    let root_line = text.lines().next().unwrap();
    let readme = root_line
        .split("\",\"")
        .find(|field| field.starts_with("readme.txt*"))
        .unwrap();
    let hash = readme.split('*').nth(3).unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_sibling_order_keeps_children_adjacent() {
    let temp = create_test_tree();
    fs::create_dir(temp.path().join("My Folder").join("inner")).unwrap();
    let (_, text) = render(temp.path(), ScanOptions::default());

    let lines: Vec<_> = text.lines().collect();
    let position = |suffix: &str| lines.iter().position(|l| l.contains(suffix)).unwrap();
    assert!(position("/My Folder*0*") < position("/My Folder/inner*0*"));
    assert!(position("/My Folder/inner*0*") < position("/My.Folder*0*"));
    assert!(position("/My.Folder*0*") < position("/MyFolder*0*"));
}

// Quotes and backslashes are not valid in Windows file names.
#[cfg(unix)]
#[test]
fn test_special_characters_are_escaped() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a&b \"quoted\""), "x").unwrap();
    fs::write(temp.path().join("line\u{2028}sep"), "y").unwrap();
    fs::write(temp.path().join("back\\slash"), "z").unwrap();

    let (_, text) = render(temp.path(), ScanOptions::default());

    assert!(text.contains("\"a&amp;b \\\"quoted\\\"*1*"));
    assert!(text.contains("\"linesep*1*"));
    assert!(!text.contains('\u{2028}'));
    assert!(text.contains("\"back\\\\slash*1*"));
}

#[cfg(unix)]
#[test]
fn test_newline_and_star_in_names_keep_one_record_per_line() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("evil\nname.txt"), "x").unwrap();
    fs::write(temp.path().join("star*name.txt"), "y").unwrap();
    fs::write(temp.path().join("tab\tbell\u{7}"), "z").unwrap();

    let (_, text) = render(temp.path(), ScanOptions::default());

    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("\"evil\\nname.txt*1*"));
    assert!(text.contains("\"star&#42;name.txt*1*"));
    assert!(text.contains("\"tab\\tbell\\u0007*1*"));

    // Each file field still splits into exactly five parts.
    let line = text.lines().next().unwrap();
    let body = line.trim_start_matches("D.p([\"").trim_end_matches("])");
    let fields: Vec<_> = body.split("\",\"").skip(1).collect();
    assert_eq!(fields.len(), 3);
    for field in fields {
        let field = field.split("\",").next().unwrap();
        assert_eq!(field.split('*').count(), 5, "field {field:?}");
    }
}

// Other unix file systems may refuse names that are not UTF-8.
#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_siblings_keep_distinct_paths() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    for (name, child) in [(&b"d\xff"[..], "under_ff"), (&b"d\xfe"[..], "under_fe")] {
        let dir = temp.path().join(OsStr::from_bytes(name));
        fs::create_dir_all(dir.join(child)).unwrap();
    }
    fs::create_dir(temp.path().join("d%FF")).unwrap();

    let (_, text) = render(temp.path(), ScanOptions::default());
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 6);

    let heads: Vec<_> = lines
        .iter()
        .map(|l| l.trim_start_matches("D.p([\"").split("*0*").next().unwrap())
        .collect();
    let mut unique = heads.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), heads.len());

    let position = |suffix: &str| heads.iter().position(|h| h.ends_with(suffix)).unwrap();
    let lists = child_lists(&text);
    assert_eq!(lists[position("/d%FF")], [position("/d%FF/under_ff")]);
    assert_eq!(lists[position("/d%FE")], [position("/d%FE/under_fe")]);
    assert!(lists[position("/d%25FF")].is_empty());
}

#[cfg(not(windows))]
#[test]
fn test_hidden_folders_are_not_emitted() {
    let temp = create_test_tree();
    fs::create_dir(temp.path().join(".git")).unwrap();
    fs::write(temp.path().join(".git").join("HEAD"), "ref").unwrap();

    let (_, hidden_skipped) = render(temp.path(), ScanOptions::default());
    assert_eq!(hidden_skipped.lines().count(), 8);
    assert!(!hidden_skipped.contains("/.git*0*"));

    let mut options = ScanOptions::default();
    options.skip_hidden = false;
    let (_, everything) = render(temp.path(), options);
    assert_eq!(everything.lines().count(), 9);
}

#[test]
fn test_lone_root_has_empty_child_list() {
    let temp = TempDir::new().unwrap();
    let (outcome, text) = render(temp.path(), ScanOptions::default());

    assert!(!outcome.is_cancelled());
    assert_eq!(text.lines().count(), 1);
    assert!(text.ends_with(",0,\"\"])\n"));
}

#[test]
fn test_orphans_are_omitted_not_fatal() {
    let temp = create_test_tree();
    let scan = SnapshotScanner::new()
        .scan(
            &ScanOptions::new(temp.path()),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    // Drop "docs" but keep its child "docs/old".
    let folders: Vec<SnappedFolder> = scan
        .folders
        .into_iter()
        .filter(|f| f.name != "docs")
        .collect();
    let encoded = SnapshotSerializer::new().encode_to_string(&folders);
    let lists = child_lists(&encoded);

    let old = folders.iter().position(|f| f.name == "old").unwrap();
    assert_eq!(lists.len(), folders.len());
    assert!(lists.iter().flatten().all(|&i| i != old));
}

#[test]
fn test_cancel_during_scan_writes_nothing() {
    let temp = create_test_tree();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = move |p: ScanProgress| {
        if p.phase == ScanPhase::Collecting {
            trigger.cancel();
        }
    };

    let template = Template::parse("<h>[DIR DATA]<f>").unwrap();
    let generator = SnapshotGenerator::new(ScanOptions::new(temp.path()), template);
    let mut opened = false;
    let outcome = generator
        .generate(
            || {
                opened = true;
                Ok(Vec::<u8>::new())
            },
            &sink,
            &cancel,
        )
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!(!opened);
}

#[test]
fn test_cancel_during_write_leaves_partial_output() {
    let temp = create_test_tree();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = move |p: ScanProgress| {
        if p.phase == ScanPhase::Writing {
            trigger.cancel();
        }
    };

    let template = Template::parse("<h>[DIR DATA]<f>").unwrap();
    let generator = SnapshotGenerator::new(ScanOptions::new(temp.path()), template);
    let mut output = Vec::new();
    let out = &mut output;
    let outcome = generator.generate(move || Ok(out), &sink, &cancel).unwrap();

    assert_eq!(outcome, SnapshotOutcome::Cancelled { records_written: 1 });
    let text = String::from_utf8(output).unwrap();
    assert!(text.starts_with("<h>D.p(["));
    assert!(!text.ends_with("<f>"));
}

#[test]
fn test_missing_root_is_an_error() {
    let temp = TempDir::new().unwrap();
    let out_path = temp.path().join("out.html");
    let generator = SnapshotGenerator::new(
        ScanOptions::new(temp.path().join("missing")),
        Template::builtin().unwrap(),
    );

    let err = generator
        .generate_to_file(&out_path, &NoProgress, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, ExportError::Scan(_)));
    assert!(!out_path.exists());
}

#[test]
fn test_builtin_template_file_output() {
    let temp = create_test_tree();
    let out_dir = TempDir::new().unwrap();
    let out_path = out_dir.path().join("snapshot.html");

    let generator = SnapshotGenerator::new(
        ScanOptions::new(temp.path()),
        Template::builtin().unwrap(),
    )
    .with_title("Nightly & Weekly");
    let outcome = generator
        .generate_to_file(&out_path, &NoProgress, &CancellationToken::new())
        .unwrap();

    let html = fs::read_to_string(&out_path).unwrap();
    assert!(matches!(outcome, SnapshotOutcome::Completed(_)));
    assert!(html.contains("Nightly &amp; Weekly"));
    assert!(!html.contains("[DIR DATA]"));
    assert!(!html.contains("[NUM DIRS]"));
    assert_eq!(html.matches("D.p([").count(), 8);
}
