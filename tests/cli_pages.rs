use predicates::prelude::*;

fn pages_json(args: &[&str]) -> anyhow::Result<serde_json::Value> {
    let output = assert_cmd::cargo::cargo_bin_cmd!("namebook")
        .arg("pages")
        .args(args)
        .output()?;
    assert!(output.status.success(), "{output:?}");
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn pages_lists_remote_artwork_in_reading_order() -> anyhow::Result<()> {
    let json = pages_json(&[
        "--name",
        "Anna",
        "--gender",
        "boy",
        "--skin-tone",
        "light",
        "--asset-base-url",
        "https://cdn.example.com/books",
    ])?;

    assert_eq!(json["letters"], 4);
    assert_eq!(json["physical_page_count"], 20);
    let pages = json["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 10);
    assert_eq!(pages[0]["label"], "Cover");
    assert_eq!(
        pages[0]["image_path"],
        "https://cdn.example.com/books/boy-light/cover/cover.jpg"
    );
    assert_eq!(pages[1]["kind"], "dedication");

    let letter_paths: Vec<&str> = pages[4..8]
        .iter()
        .map(|p| p["image_path"].as_str().unwrap())
        .collect();
    assert_eq!(
        letter_paths,
        vec![
            "https://cdn.example.com/books/boy-light/superhero/1.jpg",
            "https://cdn.example.com/books/boy-light/superhero/14.jpg",
            "https://cdn.example.com/books/boy-light/animal/14.jpg",
            "https://cdn.example.com/books/boy-light/animal/1.jpg",
        ]
    );
    Ok(())
}

#[test]
fn pages_with_assets_dir_marks_missing_files() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let cover_dir = temp.path().join("girl-dark").join("cover");
    std::fs::create_dir_all(&cover_dir)?;
    std::fs::write(cover_dir.join("cover.webp"), b"RIFF")?;

    let assets_dir = temp.path().to_string_lossy().to_string();
    let json = pages_json(&[
        "--name",
        "Bo",
        "--gender",
        "girl",
        "--skin-tone",
        "dark",
        "--assets-dir",
        &assets_dir,
    ])?;

    let pages = json["pages"].as_array().unwrap();
    assert_eq!(pages[0]["image_path"], "/assets/girl-dark/cover/cover.webp");
    assert_eq!(pages[0]["status"], "loaded");
    assert_eq!(pages[1]["status"], "loaded");
    assert_eq!(pages[2]["status"], "error");
    assert_eq!(pages[4]["image_path"], "/assets/girl-dark/fairytale/2.jpg");
    Ok(())
}

#[test]
fn pages_rejects_unknown_gender() {
    assert_cmd::cargo::cargo_bin_cmd!("namebook")
        .args(["pages", "--name", "Al", "--gender", "robot", "--skin-tone", "light"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported gender"));
}

#[test]
fn render_refuses_to_overwrite_without_force() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("book.pdf");
    std::fs::write(&out, b"existing")?;

    assert_cmd::cargo::cargo_bin_cmd!("namebook")
        .arg("render")
        .arg("--book")
        .arg(temp.path().join("book.json"))
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert_eq!(std::fs::read(&out)?, b"existing");
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    assert_cmd::cargo::cargo_bin_cmd!("namebook")
        .env("RUST_LOG", "debug")
        .args([
            "pages",
            "--name",
            "Al",
            "--gender",
            "boy",
            "--skin-tone",
            "dark",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}

#[test]
fn deliver_reports_unknown_order() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    assert_cmd::cargo::cargo_bin_cmd!("namebook")
        .env_remove("NAMEBOOK_MAIL_API_URL")
        .env_remove("NAMEBOOK_PAYMENT_API_URL")
        .arg("deliver")
        .arg("--data-dir")
        .arg(temp.path())
        .args(["--order-id", "3fa2c1d4-0000-4000-8000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("order not found"));
    Ok(())
}
