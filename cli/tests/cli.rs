use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::json;
use tempfile::tempdir;

fn lectern(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("lectern").unwrap();
    cmd.env_remove("LECTERN_HOME")
        .env_remove("LECTERN_STORE_BACKEND")
        .env_remove("LECTERN_STORE_DB")
        .env_remove("LECTERN_STORE_FLAT")
        .args(["--home", home.to_str().unwrap(), "--backend", "flat"]);
    cmd
}

fn export_doc(object_id: &str) -> String {
    json!({
        "version": "1.0",
        "objectId": object_id,
        "objectTitle": "complex numbers",
        "objectType": "definition",
        "exportTime": 1_700_000_000_000i64,
        "messages": [
            {"role": "user", "content": "what is i?", "time": 1_700_000_000_000i64},
            {"role": "assistant", "content": "a square root of -1", "time": 1_700_000_000_500i64},
        ],
    })
    .to_string()
}

#[test]
fn status_advance_cycles() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    lectern(home.path())
        .args(["status", "get", "1.1"])
        .assert()
        .success()
        .stdout("unlearned\n");
    for expected in ["learned\n", "mastered\n", "unlearned\n", "learned\n"] {
        lectern(home.path())
            .args(["status", "advance", "1.1"])
            .assert()
            .success()
            .stdout(expected);
    }
    lectern(home.path())
        .args(["status", "list"])
        .assert()
        .success()
        .stdout(contains("1.1\tlearned"));
    Ok(())
}

#[test]
fn import_then_show_and_reimport_is_noop() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    let file = home.path().join("export.json");
    std::fs::write(&file, export_doc("1.1"))?;

    lectern(home.path())
        .args(["history", "import", "1.1", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Merged 2 messages into 1.1"));
    lectern(home.path())
        .args(["history", "import", "1.1", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Merged 0 messages"));
    lectern(home.path())
        .args(["history", "show", "1.1"])
        .assert()
        .success()
        .stdout(contains("user (imported): what is i?"))
        .stdout(contains("assistant (imported): a square root of -1"));
    Ok(())
}

#[test]
fn import_for_other_item_is_declined_without_confirmation()
-> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    let file = home.path().join("export.json");
    std::fs::write(&file, export_doc("1.1"))?;

    lectern(home.path())
        .args(["history", "import", "2.5", file.to_str().unwrap()])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(contains("Import declined"));
    lectern(home.path())
        .args(["history", "show", "2.5"])
        .assert()
        .success()
        .stdout("");

    lectern(home.path())
        .args(["history", "import", "2.5", file.to_str().unwrap(), "--yes"])
        .assert()
        .success()
        .stdout(contains("Merged 2 messages into 2.5"));
    Ok(())
}

#[test]
fn malformed_import_fails() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    let file = home.path().join("bad.json");
    std::fs::write(&file, r#"{"version": "1.0", "messages": []}"#)?;
    lectern(home.path())
        .args(["history", "import", "1.1", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("missing objectId"));
    Ok(())
}

#[test]
fn export_writes_document() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    let out = home.path().join("out.json");
    lectern(home.path())
        .args(["history", "export", "1.1", "--out", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Exported 0 messages"));
    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(doc["objectId"], "1.1");
    assert_eq!(doc["version"], "1.0");
    Ok(())
}

#[test]
fn ask_without_key_fails() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    lectern(home.path())
        .args(["ask", "1.1", "what", "is", "a", "field?"])
        .assert()
        .failure()
        .stderr(contains("no API key configured"));
    Ok(())
}

#[test]
fn key_and_page_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    lectern(home.path())
        .args(["key", "set", "sk-abcdefghijklmnop"])
        .assert()
        .success();
    lectern(home.path())
        .args(["key", "show"])
        .assert()
        .success()
        .stdout("sk-...mnop\n");

    lectern(home.path())
        .args(["page", "get"])
        .assert()
        .success()
        .stdout("no page recorded\n");
    lectern(home.path()).args(["page", "set", "42"]).assert().success();
    lectern(home.path())
        .args(["page", "get"])
        .assert()
        .success()
        .stdout("42\n");
    Ok(())
}

#[test]
fn legacy_learned_list_is_migrated_once() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    let store = home.path().join("store");
    std::fs::create_dir_all(&store)?;
    std::fs::write(
        store.join("kv.json"),
        json!({"lectern_learned": ["1.1", "1.2"]}).to_string(),
    )?;

    lectern(home.path())
        .arg("migrate")
        .assert()
        .success()
        .stdout(contains("Migrated 2 of 2"));
    lectern(home.path())
        .arg("migrate")
        .assert()
        .success()
        .stdout(contains("Migrated 0 of 2"));
    lectern(home.path())
        .args(["status", "get", "1.2"])
        .assert()
        .success()
        .stdout("learned\n");
    Ok(())
}

#[test]
fn snapshots_need_and_use_the_folder() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    let folder = tempdir()?;
    let file = home.path().join("export.json");
    std::fs::write(&file, export_doc("1.1"))?;
    lectern(home.path())
        .args(["history", "import", "1.1", file.to_str().unwrap()])
        .assert()
        .success();

    lectern(home.path())
        .args(["history", "save", "1.1"])
        .assert()
        .failure()
        .stderr(contains("no folder granted"));

    let folder_arg = folder.path().to_str().unwrap();
    lectern(home.path())
        .args(["history", "save", "1.1", "--folder", folder_arg])
        .assert()
        .success()
        .stdout(contains("Saved chat_1.1_"));
    lectern(home.path())
        .args(["history", "snapshots", "1.1", "--folder", folder_arg])
        .assert()
        .success()
        .stdout(contains("2 messages"));
    lectern(home.path())
        .args(["folder", "info", "--folder", folder_arg])
        .assert()
        .success()
        .stdout(contains("granted:"));

    // A second install restores the transcript from the snapshot.
    let other_home = tempdir()?;
    let names: Vec<String> = std::fs::read_dir(folder.path())?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("chat_"))
        .collect();
    assert_eq!(names.len(), 1);
    lectern(other_home.path())
        .args(["history", "restore", "1.1", &names[0], "--folder", folder_arg])
        .assert()
        .success()
        .stdout(contains("Merged 2 messages into 1.1"));

    // Names that step outside the granted folder are refused.
    let escaped = format!("../{}", names[0]);
    lectern(other_home.path())
        .args(["history", "restore", "1.1", &escaped, "--folder", folder_arg])
        .assert()
        .failure()
        .stderr(contains("not a chat snapshot name"));
    Ok(())
}

#[test]
fn outline_lists_generated_exercises() -> Result<(), Box<dyn std::error::Error>> {
    let home = tempdir()?;
    std::fs::write(
        home.path().join("outline.json"),
        json!({"chapters": [{"id": "ch1", "title": "Vector Spaces", "sections": [{
            "id": "1A", "title": "R^n", "page": 16,
            "objects": [{"id": "1.1", "type": "definition", "title": "complex numbers", "page": 16}],
            "exercises": {"page": 24, "count": 2}
        }]}]})
        .to_string(),
    )?;
    std::fs::write(home.path().join("config.toml"), "outline = \"outline.json\"\n")?;

    lectern(home.path())
        .arg("outline")
        .assert()
        .success()
        .stdout(contains("Ex.1A.2\texercise\tunlearned\tExercise 2"));
    lectern(home.path())
        .args(["status", "advance", "1.1"])
        .assert()
        .success();
    lectern(home.path())
        .arg("progress")
        .assert()
        .success()
        .stdout(contains("1 learned, 0 mastered, 3 total (33%)"));
    Ok(())
}
