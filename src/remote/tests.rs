//! Unit tests for SSH argument building, process runners and key generation.

use std::ffi::OsString;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;

struct WritingKeygen;

impl CommandRunner for WritingKeygen {
    fn run(&self, _program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let path = args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_else(|| panic!("key path argument missing"));
        fs::write(&path, "PRIVATE KEY\n").unwrap_or_else(|err| panic!("write private: {err}"));
        fs::write(format!("{path}.pub"), "ssh-rsa AAAA kiln\n")
            .unwrap_or_else(|err| panic!("write public: {err}"));
        Ok(CommandOutput {
            code: Some(0),
            ..CommandOutput::default()
        })
    }
}

struct FailingKeygen;

impl CommandRunner for FailingKeygen {
    fn run(&self, _program: &str, _args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        Ok(CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: String::from("unsupported key type\n"),
        })
    }
}

#[fixture]
fn target() -> SessionTarget {
    SessionTarget {
        address: SocketAddr::from(([203, 0, 113, 10], 22)),
        username: String::from("root"),
        key: SshKeyPair::in_memory("PRIVATE", "ssh-rsa AAAA kiln")
            .with_identity_file("/tmp/kiln_key"),
    }
}

fn as_strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn ssh_args_carry_identity_options_and_command(target: SessionTarget) {
    let settings = SshSettings {
        ssh_bin: String::from("ssh"),
        connect_timeout: Duration::from_secs(7),
    };

    let args = as_strings(&settings.build_args(&target, "uname -a"));

    assert_eq!(args.first().map(String::as_str), Some("-p"));
    assert_eq!(args.get(1).map(String::as_str), Some("22"));
    assert!(args.windows(2).any(|pair| pair == ["-i", "/tmp/kiln_key"]));
    assert!(args.contains(&String::from("BatchMode=yes")));
    assert!(args.contains(&String::from("ConnectTimeout=7")));
    assert_eq!(
        args.iter().rev().take(2).cloned().collect::<Vec<_>>(),
        vec![String::from("uname -a"), String::from("root@203.0.113.10")]
    );
}

#[rstest]
fn connector_refuses_keys_without_identity_file(mut target: SessionTarget) {
    target.key = SshKeyPair::in_memory("PRIVATE", "ssh-rsa AAAA kiln");
    let connector = SshConnector::new(SshSettings::default(), ProcessCommandRunner);

    let result = connector.open(&target);

    assert!(matches!(result, Err(RemoteError::MissingIdentity)));
}

#[rstest]
fn authorized_key_entry_prefixes_username() {
    let pair = SshKeyPair::in_memory("PRIVATE", "ssh-rsa AAAA kiln\n");
    assert_eq!(pair.authorized_key_entry("root"), "root:ssh-rsa AAAA kiln");
}

#[rstest]
fn key_pair_debug_omits_private_key() {
    let pair = SshKeyPair::in_memory("SECRET MATERIAL", "ssh-rsa AAAA kiln");
    assert!(!format!("{pair:?}").contains("SECRET MATERIAL"));
}

#[rstest]
fn keygen_reads_back_generated_files() {
    let generator = SshKeygen::new("ssh-keygen", WritingKeygen);

    let pair = generator
        .generate()
        .unwrap_or_else(|err| panic!("generate: {err}"));

    assert_eq!(pair.private_key, "PRIVATE KEY\n");
    assert_eq!(pair.public_key, "ssh-rsa AAAA kiln");
    let identity = pair
        .identity_file
        .clone()
        .unwrap_or_else(|| panic!("identity file missing"));
    assert!(identity.as_std_path().exists());
    drop(pair);
    assert!(!identity.as_std_path().exists());
}

#[rstest]
fn keygen_reports_non_zero_exit() {
    let generator = SshKeygen::new("ssh-keygen", FailingKeygen);

    let err = generator
        .generate()
        .err()
        .unwrap_or_else(|| panic!("expected failure"));

    assert_eq!(
        err,
        KeyError::Failed {
            program: String::from("ssh-keygen"),
            status: String::from("1"),
            stderr: String::from("unsupported key type"),
        }
    );
}

#[rstest]
#[case("printf out && printf err 1>&2", Some(0), "out", "err")]
#[case("printf out; exit 42", Some(42), "out", "")]
fn streaming_runner_captures_output(
    #[case] script: &str,
    #[case] code: Option<i32>,
    #[case] stdout: &str,
    #[case] stderr: &str,
) {
    let output = StreamingCommandRunner
        .run("sh", &[OsString::from("-c"), OsString::from(script)])
        .unwrap_or_else(|err| panic!("run: {err}"));

    assert_eq!(output.code, code);
    assert_eq!(output.stdout, stdout);
    assert_eq!(output.stderr, stderr);
}

#[rstest]
fn process_runner_reports_spawn_failure() {
    let err = ProcessCommandRunner
        .run("kiln-definitely-missing-binary", &[])
        .err()
        .unwrap_or_else(|| panic!("expected spawn failure"));

    assert!(matches!(err, RemoteError::Spawn { .. }));
}

#[rstest]
fn remote_output_status_text() {
    let output = RemoteCommandOutput {
        exit_code: None,
        ..RemoteCommandOutput::default()
    };
    assert_eq!(output.status_text(), "unknown");
    assert!(!output.is_success());
}

#[tokio::test]
async fn reachability_check_reports_closed_port_as_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap_or_else(|err| panic!("bind: {err}"));
    let address = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("local addr: {err}"));
    let connector = SshConnector::new(SshSettings::default(), ProcessCommandRunner);

    assert!(connector.is_reachable(address).await);
    drop(listener);
    assert!(!connector.is_reachable(address).await);
}
