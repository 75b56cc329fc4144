use std::path::PathBuf;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_xmlshader")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "xmlshader.exe"
            } else {
                "xmlshader"
            });
            p
        })
}

fn write_shader(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(
        &path,
        r#"<shader name="lit" type="xmlshader">
  <?if vars."light count".int > 0?>
    <technique priority="200"><pass><fp plugin="glfp"/></pass></technique>
  <?endif?>
  <technique priority="100"><pass/></technique>
</shader>"#,
    )
    .unwrap();
    path
}

#[test]
fn cli_ticket_selects_a_variant() {
    let shader = write_shader("ticket.xml");
    let out = std::process::Command::new(exe())
        .args(["ticket", "--in"])
        .arg(&shader)
        .args(["--var", "light count=int:2"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("ticket: "), "{stdout}");
    assert!(stdout.contains("passes: 1"), "{stdout}");
}

#[test]
fn cli_rejects_malformed_variables() {
    let shader = write_shader("bad_var.xml");
    let status = std::process::Command::new(exe())
        .args(["ticket", "--in"])
        .arg(&shader)
        .args(["--var", "light count"])
        .status()
        .unwrap();
    assert!(!status.success());
}
