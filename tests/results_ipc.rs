use rust_xlsxwriter::Workbook;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Template layout: banner on row 1, headers on row 5, data from row 6.
fn write_template(path: &Path, sheets: &[(&str, &[(&str, &str, f64)])]) {
    let mut wb = Workbook::new();
    for (name, rows) in sheets {
        let ws = wb.add_worksheet();
        ws.set_name(*name).expect("sheet name");
        ws.write_string(0, 0, "Half-yearly examination").expect("banner");
        for (c, h) in ["SL", "Name", "Reg", "Mark"].iter().enumerate() {
            ws.write_string(4, c as u16, *h).expect("header");
        }
        for (i, (reg, student, mark)) in rows.iter().enumerate() {
            let r = 5 + i as u32;
            ws.write_number(r, 0, (i + 1) as f64).expect("sl");
            ws.write_string(r, 1, *student).expect("name");
            ws.write_string(r, 2, *reg).expect("reg");
            ws.write_number(r, 3, *mark).expect("mark");
        }
    }
    wb.save(path).expect("save workbook");
}

fn upload_copy(src: &Path, dir: &Path, name: &str) -> PathBuf {
    let dst = dir.join(name);
    std::fs::copy(src, &dst).expect("stage upload");
    dst
}

#[test]
fn ingest_then_search_round_trip() {
    let workspace = temp_dir("resultsd-ipc-roundtrip");
    let uploads = temp_dir("resultsd-ipc-uploads");
    let template = uploads.join("template.xlsx");
    write_template(
        &template,
        &[
            ("Batch-9B", &[("2024001", "Alice", 85.0), ("2024002", "Bob", 41.0)]),
            ("Batch-9C", &[("2024001", "Alice C", 64.0)]),
        ],
    );

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let upload = upload_copy(&template, &uploads, "upload-1");
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.ingest",
        json!({ "filePath": upload.to_string_lossy() }),
    );
    assert_eq!(summary.get("count").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        summary.get("sheetsProcessed").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert!(!upload.exists(), "upload should be removed after ingest");

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.search",
        json!({ "reg": "2024001", "className": "9", "batch": "B" }),
    );
    let results = found
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array");
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0],
        json!({
            "registration_number": "2024001",
            "student_name": "Alice",
            "class": "9",
            "batch": "B",
            "subject": "English",
            "marks": 85.0,
            "grade": "A+",
            "exam_date": "Exam-4"
        })
    );

    // Same student in another batch is a separate record.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.search",
        json!({ "reg": "2024001", "className": "9", "batch": "C" }),
    );
    assert_eq!(
        other["results"][0]["student_name"].as_str(),
        Some("Alice C")
    );

    // Second upload of the same workbook replaces, never appends.
    let upload = upload_copy(&template, &uploads, "upload-2");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.ingest",
        json!({ "filePath": upload.to_string_lossy() }),
    );
    let health = request_ok(&mut stdin, &mut reader, "6", "health", json!({}));
    assert_eq!(health.get("resultCount").and_then(|v| v.as_u64()), Some(3));

    let cleared = request_ok(&mut stdin, &mut reader, "7", "results.clear", json!({}));
    assert_eq!(cleared.get("deleted").and_then(|v| v.as_u64()), Some(3));
    let missing = request(
        &mut stdin,
        &mut reader,
        "8",
        "results.search",
        json!({ "reg": "2024001", "className": "9", "batch": "B" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(uploads);
}

#[test]
fn request_errors_map_to_codes() {
    let workspace = temp_dir("resultsd-ipc-errors");
    let uploads = temp_dir("resultsd-ipc-errors-uploads");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let before = request(
        &mut stdin,
        &mut reader,
        "1",
        "results.search",
        json!({ "reg": "1", "className": "9", "batch": "B" }),
    );
    assert_eq!(error_code(&before), "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let partial = request(
        &mut stdin,
        &mut reader,
        "3",
        "results.search",
        json!({ "reg": "1", "batch": "B" }),
    );
    assert_eq!(error_code(&partial), "bad_params");

    let not_a_workbook = uploads.join("upload-garbage");
    std::fs::write(&not_a_workbook, [0u8, 1, 2, 3, 255, 254]).expect("write upload");
    let decode = request(
        &mut stdin,
        &mut reader,
        "4",
        "results.ingest",
        json!({ "filePath": not_a_workbook.to_string_lossy() }),
    );
    assert_eq!(error_code(&decode), "decode_failed");
    assert!(!not_a_workbook.exists(), "failed upload should be removed");

    let wrong_template = uploads.join("upload-wrong.xlsx");
    write_template(&wrong_template, &[("Batch-9B", &[])]);
    let empty = request(
        &mut stdin,
        &mut reader,
        "5",
        "results.ingest",
        json!({ "filePath": wrong_template.to_string_lossy() }),
    );
    assert_eq!(error_code(&empty), "no_valid_data");
    assert!(empty["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("SL, Name, Reg, Mark"));
    assert!(!wrong_template.exists());

    let unknown = request(&mut stdin, &mut reader, "6", "results.export", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(uploads);
}

#[test]
fn csv_upload_and_workspace_config() {
    let workspace = temp_dir("resultsd-ipc-csv");
    let uploads = temp_dir("resultsd-ipc-csv-uploads");
    std::fs::write(
        workspace.join("ingest.json"),
        r#"{ "defaultSubject": "Mathematics", "defaultExamDate": "Exam-5" }"#,
    )
    .expect("write ingest.json");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        selected["config"]["defaultSubject"].as_str(),
        Some("Mathematics")
    );

    let csv = uploads.join("upload-csv");
    std::fs::write(
        &csv,
        "Results\n\n\n\nSL,Full Name,Registration No,Score\n1,Dana,2024010,N/A\n2,,2024011,90\n",
    )
    .expect("write csv");
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.ingest",
        json!({ "filePath": csv.to_string_lossy() }),
    );
    assert_eq!(summary.get("count").and_then(|v| v.as_u64()), Some(1));

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.search",
        json!({ "reg": "2024010", "className": "Unknown", "batch": "Unknown" }),
    );
    let row = &found["results"][0];
    assert_eq!(row["subject"].as_str(), Some("Mathematics"));
    assert_eq!(row["exam_date"].as_str(), Some("Exam-5"));
    assert_eq!(row["marks"].as_f64(), Some(0.0));
    assert_eq!(row["grade"].as_str(), Some("F"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(uploads);
}
