use pretty_assertions::assert_eq;

use super::{
    ClientMetadata,
    Environment,
    FaasEnvironmentName,
    Handshaker,
    HandshakerOptions,
    RuntimeEnvironment,
    MAX_CLIENT_METADATA_SIZE,
};
use crate::{
    bson::{doc, Document},
    bson_util,
    options::DriverInfo,
};

fn lambda_in_docker() -> Environment {
    Environment::with_vars([
        ("AWS_EXECUTION_ENV", "AWS_Lambda_java8"),
        ("AWS_REGION", "us-east-2"),
        ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "1024"),
    ])
    .in_docker()
}

fn client_document(options: HandshakerOptions, environment: &Environment) -> Document {
    let handshaker = Handshaker::with_environment(options, None, environment).unwrap();
    handshaker.hello().client_metadata.clone().unwrap()
}

fn with_app_name(len: usize) -> HandshakerOptions {
    HandshakerOptions {
        app_name: Some("a".repeat(len)),
        ..Default::default()
    }
}

fn size_with_empty_app_name(metadata: &ClientMetadata) -> usize {
    let mut metadata = metadata.clone();
    metadata.application = Some(super::AppMetadata {
        name: String::new(),
    });
    bson_util::doc_size_bytes(&Document::from(&metadata)).unwrap()
}

fn keys(document: &Document) -> Vec<&str> {
    document.keys().map(String::as_str).collect()
}

#[test]
fn metadata_no_options() {
    let metadata = client_document(HandshakerOptions::default(), &Environment::default());
    assert!(!metadata.contains_key("application"));
    assert!(!metadata.contains_key("env"));

    let driver = metadata.get_document("driver").unwrap();
    assert_eq!(keys(driver), vec!["name", "version"]);
    assert_eq!(driver.get_str("name"), Ok("mongodb-core"));
    assert_eq!(driver.get_str("version"), Ok(env!("CARGO_PKG_VERSION")));

    let os = metadata.get_document("os").unwrap();
    assert_eq!(os.get_str("type"), Ok(std::env::consts::OS));
    assert_eq!(os.get_str("architecture"), Ok(std::env::consts::ARCH));
    assert!(metadata.get_str("platform").unwrap().ends_with("with tokio"));
}

#[test]
fn metadata_with_options() {
    let app_name = "myspace 2.0";
    let name = "even better Rust driver";
    let version = "the best version, of course";

    let options = HandshakerOptions {
        app_name: Some(app_name.to_string()),
        driver_info: Some(
            DriverInfo::builder()
                .name(name.to_string())
                .version(version.to_string())
                .platform("tests".to_string())
                .build(),
        ),
        ..Default::default()
    };

    let metadata = client_document(options, &Environment::default());
    assert_eq!(
        metadata.get_document("application"),
        Ok(&doc! { "name": app_name })
    );

    let driver = metadata.get_document("driver").unwrap();
    assert_eq!(
        driver.get_str("name"),
        Ok(format!("mongodb-core|{name}").as_str())
    );
    assert_eq!(
        driver.get_str("version"),
        Ok(format!("{}|{}", env!("CARGO_PKG_VERSION"), version).as_str())
    );
    assert!(metadata.get_str("platform").unwrap().ends_with("|tests"));
}

#[test]
fn faas_detection() {
    let detect = |vars: &[(&str, &str)]| {
        RuntimeEnvironment::new(&Environment::with_vars(vars.iter().copied()))
            .and_then(|env| env.name)
    };

    assert_eq!(
        detect(&[("AWS_EXECUTION_ENV", "AWS_Lambda_python3.11")]),
        Some(FaasEnvironmentName::AwsLambda)
    );
    assert_eq!(detect(&[("AWS_EXECUTION_ENV", "EC2")]), None);
    assert_eq!(
        detect(&[("AWS_LAMBDA_RUNTIME_API", "127.0.0.1:9001")]),
        Some(FaasEnvironmentName::AwsLambda)
    );
    assert_eq!(
        detect(&[("FUNCTIONS_WORKER_RUNTIME", "node")]),
        Some(FaasEnvironmentName::AzureFunc)
    );
    assert_eq!(
        detect(&[("K_SERVICE", "svc")]),
        Some(FaasEnvironmentName::GcpFunc)
    );
    assert_eq!(detect(&[("VERCEL", "1")]), Some(FaasEnvironmentName::Vercel));
    assert_eq!(detect(&[("VERCEL", "")]), None);
}

#[test]
fn vercel_supersedes_lambda() {
    let environment = Environment::with_vars([
        ("AWS_EXECUTION_ENV", "AWS_Lambda_java8"),
        ("AWS_REGION", "us-east-2"),
        ("VERCEL", "1"),
        ("VERCEL_REGION", "cdg1"),
    ]);
    let metadata = client_document(HandshakerOptions::default(), &environment);
    assert_eq!(
        metadata.get_document("env"),
        Ok(&doc! { "name": "vercel", "region": "cdg1" })
    );
}

#[test]
fn conflicting_faas_omits_env() {
    let environment = Environment::with_vars([
        ("AWS_EXECUTION_ENV", "AWS_Lambda_java8"),
        ("FUNCTIONS_WORKER_RUNTIME", "node"),
    ])
    .in_docker();
    let metadata = client_document(HandshakerOptions::default(), &environment);
    assert!(!metadata.contains_key("env"));
}

#[test]
fn gcp_fields() {
    let environment = Environment::with_vars([
        ("FUNCTION_NAME", "f"),
        ("FUNCTION_MEMORY_MB", "1024"),
        ("FUNCTION_TIMEOUT_SEC", "60"),
        ("FUNCTION_REGION", "us-central1"),
    ]);
    let metadata = client_document(HandshakerOptions::default(), &environment);
    assert_eq!(
        metadata.get_document("env"),
        Ok(&doc! {
            "name": "gcp.func",
            "timeout_sec": 60,
            "memory_mb": 1024,
            "region": "us-central1",
        })
    );
}

#[test]
fn container_without_faas() {
    let environment =
        Environment::with_vars([("KUBERNETES_SERVICE_HOST", "10.0.0.1")]).in_docker();
    let metadata = client_document(HandshakerOptions::default(), &environment);
    assert_eq!(
        metadata.get_document("env"),
        Ok(&doc! {
            "container": { "runtime": "docker", "orchestrator": "kubernetes" }
        })
    );
}

#[test]
fn truncation_thresholds() {
    let environment = lambda_in_docker();
    let full = ClientMetadata::new(&environment);

    // Largest application name that still fits at each stage.
    let mut stage = full.clone();
    let untouched = MAX_CLIENT_METADATA_SIZE - size_with_empty_app_name(&stage);
    if let Some(ref mut env) = stage.env {
        env.keep_only_name();
    }
    let env_name_only = MAX_CLIENT_METADATA_SIZE - size_with_empty_app_name(&stage);
    stage.os.architecture = None;
    let os_type_only = MAX_CLIENT_METADATA_SIZE - size_with_empty_app_name(&stage);
    stage.env = None;
    let without_env = MAX_CLIENT_METADATA_SIZE - size_with_empty_app_name(&stage);

    let at = |len: usize| client_document(with_app_name(len), &environment);

    let metadata = at(untouched);
    assert_eq!(
        keys(&metadata),
        vec!["application", "driver", "os", "platform", "env"]
    );
    assert_eq!(
        metadata.get_document("env"),
        Ok(&doc! {
            "name": "aws.lambda",
            "memory_mb": 1024,
            "region": "us-east-2",
            "container": { "runtime": "docker" },
        })
    );

    let metadata = at(untouched + 1);
    assert_eq!(
        metadata.get_document("env"),
        Ok(&doc! { "name": "aws.lambda" })
    );
    assert!(metadata
        .get_document("os")
        .unwrap()
        .contains_key("architecture"));

    let metadata = at(env_name_only + 1);
    assert_eq!(keys(metadata.get_document("os").unwrap()), vec!["type"]);
    assert!(metadata.contains_key("env"));

    let metadata = at(os_type_only + 1);
    assert!(!metadata.contains_key("env"));
    assert!(metadata.contains_key("platform"));

    let metadata = at(without_env + 1);
    assert_eq!(keys(&metadata), vec!["application", "driver", "os"]);
}

#[test]
fn oversized_application_name_fits_cap() {
    let metadata = client_document(with_app_name(400), &lambda_in_docker());
    assert_eq!(keys(&metadata), vec!["application", "driver", "os"]);
    assert_eq!(keys(metadata.get_document("os").unwrap()), vec!["type"]);
    assert!(bson_util::doc_size_bytes(&metadata).unwrap() <= MAX_CLIENT_METADATA_SIZE);
}

#[test]
fn hello_carries_compressors_and_metadata() {
    let handshaker = Handshaker::with_environment(
        HandshakerOptions {
            load_balanced: true,
            ..Default::default()
        },
        None,
        &Environment::default(),
    )
    .unwrap();
    let command = handshaker.hello().command().unwrap();
    assert_eq!(command.name, "hello");
    assert!(!command.legacy);
    assert_eq!(command.body.get_bool("loadBalanced"), Ok(true));
    assert!(command.body.contains_key("client"));
    assert!(!command.body.contains_key("compression"));
}
