use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::{Command, Output};
use tempfile::TempDir;

fn refscope(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("refscope").expect("Binary not built");
    cmd.env("REFSCOPE_CONFIG", config_dir.path().join("config.json"))
        .env_remove("REFSCOPE_LOG");
    cmd
}

/// Runs the binary off the runtime's worker threads so the in-process server keeps serving.
async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().expect("Failed to run refscope"))
        .await
        .expect("Blocking task panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_services_address_flag() {
    let addr = schema_fixtures::spawn_reflection_server().await.to_string();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = refscope(&dir);
    cmd.args(["dynamic", "list-services", "--insecure", "--address", addr.as_str()]);

    run(cmd)
        .await
        .assert()
        .success()
        .stdout("pkg.Alpha\npkg.Reflect\n")
        .stderr("");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_services_chain_id() {
    let addr = schema_fixtures::spawn_reflection_server().await.to_string();
    let dir = tempfile::tempdir().unwrap();

    let mut edit = refscope(&dir);
    edit.args(["chains", "edit", "cosmoshub", "grpc-addr", addr.as_str()]);
    run(edit).await.assert().success();

    let mut cmd = refscope(&dir);
    cmd.args(["dynamic", "list-services", "cosmoshub", "--insecure"]);

    run(cmd)
        .await
        .assert()
        .success()
        .stdout("pkg.Alpha\npkg.Reflect\n")
        .stderr("");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_methods_alias() {
    let addr = schema_fixtures::spawn_reflection_server().await.to_string();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = refscope(&dir);
    cmd.args(["dyn", "lm", "pkg.Alpha", "--insecure", "--address", addr.as_str()]);

    run(cmd)
        .await
        .assert()
        .success()
        .stdout("Get\nPut\nDelete\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_show_messages_prints_json() {
    let addr = schema_fixtures::spawn_reflection_server().await.to_string();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = refscope(&dir);
    cmd.args([
        "dynamic",
        "show-messages",
        "pkg.Alpha.Get",
        "--insecure",
        "--address",
        addr.as_str(),
    ]);

    let output = run(cmd).await;
    output.clone().assert().success();

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "Input": { "key": "TYPE_STRING" },
            "Output": { "item": "pkg.Item" }
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inspect_method() {
    let addr = schema_fixtures::spawn_reflection_server().await.to_string();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = refscope(&dir);
    cmd.args([
        "dynamic",
        "inspect",
        "--service",
        "pkg.Alpha",
        "--method",
        "Get",
        "--insecure",
        "--address",
        addr.as_str(),
    ]);

    run(cmd)
        .await
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with(
                "rpc Get ( .pkg.GetRequest ) returns ( .pkg.GetResponse );\n",
            )
            .and(predicate::str::contains("// pkg.Tag (pkg/common.proto)\n"))
            .and(predicate::str::contains("map<string, .pkg.Tag> tags = 5;")),
        );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_service_lists_alternatives() {
    let addr = schema_fixtures::spawn_reflection_server().await.to_string();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = refscope(&dir);
    cmd.args(["dynamic", "list-methods", "foo.Bar", "--insecure", "--address", addr.as_str()]);

    run(cmd)
        .await
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            r#"no service "foo.Bar" found (available services: pkg.Alpha, pkg.Reflect)"#,
        ));
}

#[test]
fn test_reject_both_chain_and_address() {
    let dir = tempfile::tempdir().unwrap();

    refscope(&dir)
        .args([
            "dynamic",
            "list-services",
            "cosmoshub",
            "--insecure",
            "--address",
            "server.invalid:80",
        ])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("must provide exactly one of"));
}

#[test]
fn test_reject_missing_chain_and_address() {
    let dir = tempfile::tempdir().unwrap();

    refscope(&dir)
        .args(["dynamic", "list-services"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("must provide exactly one of"));
}

#[test]
fn test_unknown_chain_lists_configured_chains() {
    let dir = tempfile::tempdir().unwrap();

    for chain in ["osmosis", "cosmoshub"] {
        refscope(&dir)
            .args(["chains", "edit", chain, "grpc-addr", "localhost:1"])
            .assert()
            .success();
    }

    refscope(&dir)
        .args(["dynamic", "ls", "juno"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            r#"no chain "juno" found (available chains: cosmoshub, osmosis)"#,
        ));
}

#[test]
fn test_chain_without_address() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{ "chains": { "osmosis": {} } }"#,
    )
    .unwrap();

    refscope(&dir)
        .args(["dynamic", "ls", "osmosis"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            r#"no gRPC address set for chain "osmosis""#,
        ));
}

#[test]
fn test_malformed_method_rejected_before_dial() {
    let dir = tempfile::tempdir().unwrap();

    // Nothing listens on port 1, a dial attempt would report a connection error instead.
    refscope(&dir)
        .args([
            "dynamic",
            "show-messages",
            "NoDot",
            "--insecure",
            "--address",
            "127.0.0.1:1",
        ])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            r#"invalid method "NoDot": expected format namespace[.namespace...].method"#,
        ));
}

#[test]
fn test_dial_failure_names_address() {
    let dir = tempfile::tempdir().unwrap();

    refscope(&dir)
        .args(["dynamic", "ls", "--insecure", "--address", "127.0.0.1:1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            r#"failed to dial gRPC address "127.0.0.1:1""#,
        ));
}

#[test]
fn test_chains_show_and_list() {
    let dir = tempfile::tempdir().unwrap();

    refscope(&dir)
        .args(["chains", "edit", "cosmoshub", "grpc-addr", "localhost:9090"])
        .assert()
        .success();

    refscope(&dir)
        .args(["chains", "show", "cosmoshub"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""grpc_addr": "localhost:9090""#));

    refscope(&dir)
        .args(["chains", "list"])
        .assert()
        .success()
        .stdout("cosmoshub\tlocalhost:9090\n");
}
