use rstest::rstest;

use crate::compute::{ComputeError, resolve_image, resolve_machine_type, resolve_network};
use crate::test_support::FakeCompute;

#[rstest]
#[tokio::test]
async fn image_in_own_project_skips_fallback() {
    let compute = FakeCompute::with_defaults().with_image("kiln-project", "golden");

    let image = resolve_image(&compute, "golden", "debian-cloud")
        .await
        .unwrap_or_else(|err| panic!("image should resolve: {err}"));

    assert_eq!(image.name, "golden");
    assert_eq!(compute.calls(), ["get_image kiln-project/golden"]);
}

#[rstest]
#[tokio::test]
async fn image_falls_back_to_public_project() {
    let compute = FakeCompute::with_defaults();

    let image = resolve_image(&compute, "debian-9", "debian-cloud")
        .await
        .unwrap_or_else(|err| panic!("image should resolve: {err}"));

    assert!(image.self_link.as_str().contains("debian-cloud"));
    assert_eq!(
        compute.calls(),
        ["get_image kiln-project/debian-9", "get_image debian-cloud/debian-9"]
    );
}

#[rstest]
#[tokio::test]
async fn missing_image_names_both_projects() {
    let compute = FakeCompute::with_defaults();

    let err = resolve_image(&compute, "nowhere", "debian-cloud")
        .await
        .err()
        .unwrap_or_else(|| panic!("image should not resolve"));

    assert_eq!(
        err,
        ComputeError::ImageNotFound {
            name: String::from("nowhere"),
            projects: vec![String::from("kiln-project"), String::from("debian-cloud")],
        }
    );
    assert_eq!(
        err.to_string(),
        "image 'nowhere' not found in projects kiln-project, debian-cloud"
    );
}

#[rstest]
#[tokio::test]
async fn fallback_equal_to_own_project_is_not_queried_twice() {
    let compute = FakeCompute::with_defaults();

    let err = resolve_image(&compute, "nowhere", "kiln-project")
        .await
        .err()
        .unwrap_or_else(|| panic!("image should not resolve"));

    assert!(matches!(err, ComputeError::ImageNotFound { ref projects, .. } if projects.len() == 1));
    assert_eq!(compute.count_calls("get_image"), 1);
}

#[rstest]
#[tokio::test]
async fn non_not_found_errors_do_not_trigger_fallback() {
    let compute = FakeCompute::with_defaults();
    compute.fail(
        "get_image",
        ComputeError::Api {
            status: 403,
            message: String::from("forbidden"),
        },
    );

    let err = resolve_image(&compute, "debian-9", "debian-cloud")
        .await
        .err()
        .unwrap_or_else(|| panic!("lookup should fail"));

    assert!(matches!(err, ComputeError::Api { status: 403, .. }));
    assert_eq!(compute.count_calls("get_image"), 1);
}

#[rstest]
#[case("DEPRECATED")]
#[case("OBSOLETE")]
#[case("DELETED")]
#[tokio::test]
async fn retired_machine_types_are_rejected(#[case] state: &str) {
    let compute =
        FakeCompute::with_defaults().with_deprecated_machine_type("us-central1-a", "f1-micro", state);

    let err = resolve_machine_type(&compute, "us-central1-a", "f1-micro")
        .await
        .err()
        .unwrap_or_else(|| panic!("machine type should be rejected"));

    assert_eq!(
        err,
        ComputeError::MachineTypeUnavailable {
            name: String::from("f1-micro"),
            zone: String::from("us-central1-a"),
            state: state.to_owned(),
        }
    );
}

#[rstest]
#[tokio::test]
async fn active_deprecation_record_is_accepted() {
    let compute = FakeCompute::with_defaults().with_deprecated_machine_type(
        "us-central1-a",
        "e2-small",
        "ACTIVE",
    );

    let machine_type = resolve_machine_type(&compute, "us-central1-a", "e2-small")
        .await
        .unwrap_or_else(|err| panic!("machine type should resolve: {err}"));

    assert_eq!(machine_type.name, "e2-small");
}

#[rstest]
#[tokio::test]
async fn unknown_network_is_not_found() {
    let compute = FakeCompute::with_defaults();

    let err = resolve_network(&compute, "private")
        .await
        .err()
        .unwrap_or_else(|| panic!("network should not resolve"));

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "network 'private' not found");
}
