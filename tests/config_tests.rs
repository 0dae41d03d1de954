//! Tests for configuration loading and build-request validation.

use std::time::Duration;

use kiln::config::SSH_KEYS_METADATA_KEY;
use kiln::test_support::{EnvGuard, example_request_builder};
use kiln::{BuildConfig, BuildRequest, ConfigError};
use rstest::rstest;

fn problems(err: ConfigError) -> Vec<String> {
    let ConfigError::Invalid(list) = err else {
        panic!("expected Invalid error, got {err}");
    };
    list
}

#[test]
fn valid_request_applies_defaults_and_derived_urls() {
    let request = example_request_builder()
        .build()
        .unwrap_or_else(|err| panic!("request should be valid: {err}"));

    assert_eq!(request.machine_type, "n1-standard-1");
    assert_eq!(request.fallback_image_project, "debian-cloud");
    assert_eq!(request.ssh_username, "root");
    assert_eq!(request.ssh_port, 22);
    assert_eq!(request.state_timeout, Duration::from_secs(300));
    assert_eq!(request.image_description, "Created by kiln");
    assert_eq!(request.archive_name(), "packer-1234.tar.gz");
    assert_eq!(
        request.archive_upload_url(),
        "gs://kiln-images/packer-1234.tar.gz"
    );
}

#[test]
fn validation_reports_every_missing_field_at_once() {
    let err = BuildRequest::builder()
        .build()
        .err()
        .unwrap_or_else(|| panic!("empty builder should be rejected"));
    let list = problems(err);

    for (env_var, toml_key) in [
        ("KILN_PROJECT_ID", "project_id"),
        ("KILN_ZONE", "zone"),
        ("KILN_SOURCE_IMAGE", "source_image"),
        ("KILN_IMAGE_NAME", "image_name"),
        ("KILN_BUCKET_NAME", "bucket_name"),
    ] {
        assert!(
            list.iter()
                .any(|problem| problem.contains(env_var) && problem.contains(toml_key)),
            "no problem mentions {env_var}: {list:?}"
        );
    }
    assert_eq!(list.len(), 5, "unexpected problems: {list:?}");
    assert!(list.iter().all(|problem| problem.contains("kiln.toml")));
}

#[test]
fn whitespace_only_values_count_as_missing() {
    let err = example_request_builder()
        .zone("   ")
        .build()
        .err()
        .unwrap_or_else(|| panic!("blank zone should be rejected"));

    assert_eq!(
        problems(err),
        ["missing zone: set KILN_ZONE or add zone to kiln.toml"]
    );
}

#[rstest]
#[case("Packer-1234")]
#[case("1-image")]
#[case("image-")]
#[case("image_name")]
fn malformed_image_names_are_rejected(#[case] name: &str) {
    let err = example_request_builder()
        .image_name(name)
        .build()
        .err()
        .unwrap_or_else(|| panic!("{name} should be rejected"));

    let list = problems(err);
    assert_eq!(list.len(), 1);
    assert!(list.iter().all(|problem| problem.contains("invalid image_name")));
}

#[test]
fn reserved_metadata_key_is_rejected() {
    let err = example_request_builder()
        .metadata(SSH_KEYS_METADATA_KEY, "root:ssh-rsa AAAA")
        .metadata("env", "prod")
        .build()
        .err()
        .unwrap_or_else(|| panic!("ssh-keys metadata should be rejected"));

    let list = problems(err);
    assert_eq!(list.len(), 1);
    assert!(list.iter().all(|problem| problem.contains("reserved")));
}

#[test]
fn independent_problems_are_aggregated() {
    let err = example_request_builder()
        .bucket_name("gs://kiln-images/archives")
        .ssh_port(0)
        .poll_interval(Duration::ZERO)
        .tag("Bad Tag")
        .build()
        .err()
        .unwrap_or_else(|| panic!("request should be rejected"));

    let message = ConfigError::Invalid(problems(err)).to_string();
    for fragment in [
        "invalid bucket_name",
        "invalid ssh_port",
        "invalid poll_interval_secs",
        "invalid tag 'Bad Tag'",
    ] {
        assert!(message.contains(fragment), "missing {fragment}: {message}");
    }
}

#[test]
fn blank_provision_commands_are_dropped() {
    let request = example_request_builder()
        .provision_command("apt-get update")
        .provision_command("   ")
        .provision_command(" apt-get install -y nginx ")
        .build()
        .unwrap_or_else(|err| panic!("request should be valid: {err}"));

    assert_eq!(
        request.provision_commands,
        ["apt-get update", "apt-get install -y nginx"]
    );
}

#[tokio::test]
async fn environment_overrides_feed_the_request() {
    let _guard = EnvGuard::set_vars(&[
        ("KILN_PROJECT_ID", "env-project"),
        ("KILN_ZONE", "europe-west1-b"),
        ("KILN_SOURCE_IMAGE", "debian-12"),
        ("KILN_BUCKET_NAME", "env-bucket"),
        ("KILN_IMAGE_NAME", "env-image"),
        ("KILN_SSH_PORT", "2222"),
    ])
    .await;

    let config = BuildConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("configuration should load: {err}"));
    let request = config
        .request_builder(None)
        .build()
        .unwrap_or_else(|err| panic!("request should be valid: {err}"));

    assert_eq!(request.project_id, "env-project");
    assert_eq!(request.zone, "europe-west1-b");
    assert_eq!(request.source_image, "debian-12");
    assert_eq!(request.bucket_name, "env-bucket");
    assert_eq!(request.image_name, "env-image");
    assert_eq!(request.ssh_port, 2222);
    assert_eq!(request.machine_type, "n1-standard-1");
}

#[tokio::test]
async fn derived_project_fills_a_missing_project_id() {
    let _guard = EnvGuard::set_vars(&[
        ("KILN_ZONE", "us-central1-a"),
        ("KILN_SOURCE_IMAGE", "debian-9"),
        ("KILN_BUCKET_NAME", "kiln-images"),
    ])
    .await;

    let config = BuildConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("configuration should load: {err}"));
    let request = config
        .request_builder(Some("123456789"))
        .build()
        .unwrap_or_else(|err| panic!("request should be valid: {err}"));

    assert_eq!(request.project_id, "123456789");
    assert!(request.image_name.starts_with("kiln-"));
}
