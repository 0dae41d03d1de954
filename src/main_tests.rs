//! Unit tests for the `kiln` CLI binary implementation.

use super::*;
use kiln::compute::types::Deprecation;
use rstest::rstest;

fn zone(name: &str) -> Zone {
    Zone {
        name: name.to_owned(),
        self_link: format!("https://example/zones/{name}").into(),
        status: Some(String::from("UP")),
    }
}

fn machine_type(name: &str, state: Option<&str>) -> MachineType {
    MachineType {
        name: name.to_owned(),
        self_link: format!("https://example/machineTypes/{name}").into(),
        deprecated: state.map(|value| Deprecation {
            state: value.to_owned(),
            replacement: None,
        }),
    }
}

fn image(name: &str) -> Image {
    Image {
        name: name.to_owned(),
        self_link: format!("https://example/images/{name}").into(),
        description: None,
        deprecated: None,
    }
}

#[rstest]
#[case("env=prod", ("env", "prod"))]
#[case("startup-script=echo a=b", ("startup-script", "echo a=b"))]
#[case(" role =", ("role", ""))]
fn parse_key_value_splits_at_first_equals(#[case] raw: &str, #[case] expected: (&str, &str)) {
    let (key, value) =
        cli::parse_key_value(raw).unwrap_or_else(|err| panic!("{raw} should parse: {err}"));

    assert_eq!((key.as_str(), value.as_str()), expected);
}

#[rstest]
#[case("novalue")]
#[case("=value")]
fn parse_key_value_rejects_malformed_pairs(#[case] raw: &str) {
    assert!(cli::parse_key_value(raw).is_err());
}

#[test]
fn build_flags_are_repeatable() {
    let parsed = Cli::try_parse_from([
        "kiln",
        "build",
        "--provision",
        "apt-get update",
        "--provision",
        "apt-get install -y nginx",
        "--metadata",
        "env=prod",
        "--tag",
        "http-server",
        "--debug",
    ])
    .unwrap_or_else(|err| panic!("arguments should parse: {err}"));

    let Cli::Build(args) = parsed else {
        panic!("expected the build subcommand");
    };
    assert_eq!(
        args.provision,
        ["apt-get update", "apt-get install -y nginx"]
    );
    assert_eq!(
        args.metadata,
        [(String::from("env"), String::from("prod"))]
    );
    assert_eq!(args.tags, ["http-server"]);
    assert!(args.debug);
    assert!(!args.update_gsutil);
}

#[test]
fn destroy_image_requires_a_name() {
    assert!(Cli::try_parse_from(["kiln", "destroy-image"]).is_err());
}

#[test]
fn inventory_flags_deprecated_machine_types() {
    let zones = [zone("us-central1-a")];
    let machine_types = (
        "us-central1-a",
        vec![
            machine_type("n1-standard-1", None),
            machine_type("e2-small", Some("ACTIVE")),
            machine_type("f1-micro", Some("DEPRECATED")),
        ],
    );
    let images = [(String::from("debian-cloud"), vec![image("debian-9")])];

    let report = render_inventory(&zones, Some(&machine_types), &images);

    assert_eq!(
        report,
        "Zones:\n  us-central1-a (UP)\nMachine types in us-central1-a:\n  n1-standard-1\n  \
         e2-small\n  f1-micro [DEPRECATED]\nImages in debian-cloud:\n  debian-9\n"
    );
}

#[test]
fn inventory_without_zone_explains_how_to_select_one() {
    let report = render_inventory(&[], None, &[]);

    assert!(report.contains("no zone selected"), "report: {report}");
}

#[test]
fn write_error_writes_cli_error() {
    let mut buf = Vec::new();
    let err = CliError::Config(ConfigError::Invalid(vec![String::from("missing zone")]));
    write_error(&mut buf, &err);
    let rendered = String::from_utf8(buf).unwrap_or_else(|utf8_err| panic!("utf8: {utf8_err}"));
    assert_eq!(
        rendered,
        "configuration error: invalid configuration: missing zone\n"
    );
}

async fn pause_within(pause: &impl PauseHook, step: &str) -> bool {
    tokio::time::timeout(Duration::from_secs(5), pause.pause(step))
        .await
        .is_ok()
}

#[tokio::test]
async fn pause_is_released_when_the_build_is_cancelled() {
    let (input, _keyboard) = tokio::io::duplex(64);
    let cancel = CancelFlag::new();
    let pause = LinePause::new(BufReader::new(input), cancel.clone());

    cancel.cancel();

    assert!(pause_within(&pause, "connect").await);
}

#[tokio::test]
async fn pause_waits_for_a_line_until_cancelled() {
    let (input, _keyboard) = tokio::io::duplex(64);
    let cancel = CancelFlag::new();
    let pause = LinePause::new(BufReader::new(input), cancel.clone());

    let waiting = tokio::spawn(async move { pause.pause("connect").await });
    tokio::task::yield_now().await;
    assert!(!waiting.is_finished());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap_or_else(|err| panic!("pause should be released: {err}"))
        .unwrap_or_else(|err| panic!("pause task: {err}"));
}

#[tokio::test]
async fn lines_typed_ahead_release_later_pauses() {
    use tokio::io::AsyncWriteExt;

    let (input, mut keyboard) = tokio::io::duplex(64);
    let pause = LinePause::new(BufReader::new(input), CancelFlag::new());
    keyboard
        .write_all(b"\n\n")
        .await
        .unwrap_or_else(|err| panic!("write: {err}"));

    assert!(pause_within(&pause, "connect").await);
    assert!(pause_within(&pause, "provision").await);
}
