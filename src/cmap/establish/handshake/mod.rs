#[cfg(test)]
mod test;

use std::{collections::HashMap, path::Path, sync::Arc, time::Instant};

use derive_more::Display;
use derive_where::derive_where;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    client::auth::Authenticator,
    cmap::{Connection, StreamDescription},
    compression::{self, Compressor},
    error::Result,
    hello::{hello_command, run_hello, AwaitableHelloOptions, HelloReply},
    operation::Hello,
    options::{ClientOptions, DriverInfo, ServerApi},
    sdam::ServerDescription,
};

/// The hard limit on the size of the `client` document sent in the handshake.
pub(crate) const MAX_CLIENT_METADATA_SIZE: usize = 512;

const DRIVER_NAME: &str = env!("CARGO_PKG_NAME");
const RUNTIME_NAME: &str = "tokio";

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ClientMetadata {
    pub(crate) application: Option<AppMetadata>,
    pub(crate) driver: DriverMetadata,
    pub(crate) os: OsMetadata,
    pub(crate) platform: Option<String>,
    pub(crate) env: Option<RuntimeEnvironment>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AppMetadata {
    pub(crate) name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DriverMetadata {
    pub(crate) name: String,
    pub(crate) version: String,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct OsMetadata {
    pub(crate) os_type: String,
    pub(crate) name: Option<String>,
    pub(crate) architecture: Option<String>,
    pub(crate) version: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct RuntimeEnvironment {
    pub(crate) name: Option<FaasEnvironmentName>,
    pub(crate) timeout_sec: Option<i32>,
    pub(crate) memory_mb: Option<i32>,
    pub(crate) region: Option<String>,
    pub(crate) container: Option<Document>,
}

#[derive(Copy, Clone, Debug, Display, PartialEq)]
pub(crate) enum FaasEnvironmentName {
    #[display("aws.lambda")]
    AwsLambda,
    #[display("azure.func")]
    AzureFunc,
    #[display("gcp.func")]
    GcpFunc,
    #[display("vercel")]
    Vercel,
}

/// A snapshot of the process environment the handshake metadata is derived from.
#[derive(Clone, Debug, Default)]
pub(crate) struct Environment {
    vars: HashMap<String, String>,
    dockerenv: bool,
}

impl Environment {
    pub(crate) fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            dockerenv: Path::new("/.dockerenv").exists(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_vars<'a>(vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            dockerenv: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_docker(mut self) -> Self {
        self.dockerenv = true;
        self
    }

    fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn var_set(&self, name: &str) -> bool {
        self.var(name).is_some()
    }

    fn parse_var(&self, name: &str) -> Option<i32> {
        self.var(name).and_then(|value| value.parse().ok())
    }
}

impl FaasEnvironmentName {
    fn detect(environment: &Environment) -> Vec<Self> {
        use FaasEnvironmentName::*;

        let mut found = Vec::new();
        if environment
            .var("AWS_EXECUTION_ENV")
            .is_some_and(|value| value.starts_with("AWS_Lambda_"))
            || environment.var_set("AWS_LAMBDA_RUNTIME_API")
        {
            found.push(AwsLambda);
        }
        if environment.var_set("FUNCTIONS_WORKER_RUNTIME") {
            found.push(AzureFunc);
        }
        if environment.var_set("K_SERVICE") || environment.var_set("FUNCTION_NAME") {
            found.push(GcpFunc);
        }
        if environment.var_set("VERCEL") {
            found.push(Vercel);
        }
        found
    }

    fn resolve(found: &[Self]) -> Option<Self> {
        use FaasEnvironmentName::*;

        match found {
            [single] => Some(*single),
            [AwsLambda, Vercel] => Some(Vercel),
            _ => None,
        }
    }
}

impl RuntimeEnvironment {
    /// Builds the `env` document, or `None` when there is nothing to report or the FaaS
    /// signals conflict.
    pub(crate) fn new(environment: &Environment) -> Option<Self> {
        let found = FaasEnvironmentName::detect(environment);
        let name = FaasEnvironmentName::resolve(&found);
        if name.is_none() && !found.is_empty() {
            // Conflicting providers.
            return None;
        }

        let mut out = Self {
            name,
            ..Default::default()
        };
        match name {
            Some(FaasEnvironmentName::AwsLambda) => {
                out.region = environment.var("AWS_REGION").map(str::to_string);
                out.memory_mb = environment.parse_var("AWS_LAMBDA_FUNCTION_MEMORY_SIZE");
            }
            Some(FaasEnvironmentName::GcpFunc) => {
                out.memory_mb = environment.parse_var("FUNCTION_MEMORY_MB");
                out.timeout_sec = environment.parse_var("FUNCTION_TIMEOUT_SEC");
                out.region = environment.var("FUNCTION_REGION").map(str::to_string);
            }
            Some(FaasEnvironmentName::Vercel) => {
                out.region = environment.var("VERCEL_REGION").map(str::to_string);
            }
            Some(FaasEnvironmentName::AzureFunc) | None => {}
        }

        let mut container = Document::new();
        if environment.dockerenv {
            container.insert("runtime", "docker");
        }
        if environment.var_set("KUBERNETES_SERVICE_HOST") {
            container.insert("orchestrator", "kubernetes");
        }
        if !container.is_empty() {
            out.container = Some(container);
        }

        if out.name.is_none() && out.container.is_none() {
            return None;
        }
        Some(out)
    }

    fn keep_only_name(&mut self) {
        *self = Self {
            name: self.name,
            ..Default::default()
        };
    }
}

impl From<&RuntimeEnvironment> for Bson {
    fn from(env: &RuntimeEnvironment) -> Self {
        let mut doc = Document::new();
        if let Some(name) = env.name {
            doc.insert("name", name.to_string());
        }
        if let Some(timeout_sec) = env.timeout_sec {
            doc.insert("timeout_sec", timeout_sec);
        }
        if let Some(memory_mb) = env.memory_mb {
            doc.insert("memory_mb", memory_mb);
        }
        if let Some(ref region) = env.region {
            doc.insert("region", region.clone());
        }
        if let Some(ref container) = env.container {
            doc.insert("container", container.clone());
        }
        Bson::Document(doc)
    }
}

impl From<&OsMetadata> for Bson {
    fn from(metadata: &OsMetadata) -> Self {
        let mut doc = doc! { "type": metadata.os_type.clone() };

        if let Some(ref name) = metadata.name {
            doc.insert("name", name.clone());
        }

        if let Some(ref architecture) = metadata.architecture {
            doc.insert("architecture", architecture.clone());
        }

        if let Some(ref version) = metadata.version {
            doc.insert("version", version.clone());
        }

        Bson::Document(doc)
    }
}

impl From<&ClientMetadata> for Document {
    fn from(metadata: &ClientMetadata) -> Self {
        let mut metadata_doc = Document::new();

        if let Some(ref application) = metadata.application {
            metadata_doc.insert("application", doc! { "name": application.name.clone() });
        }

        metadata_doc.insert(
            "driver",
            doc! {
                "name": metadata.driver.name.clone(),
                "version": metadata.driver.version.clone(),
            },
        );

        metadata_doc.insert("os", &metadata.os);

        if let Some(ref platform) = metadata.platform {
            metadata_doc.insert("platform", platform.clone());
        }

        if let Some(ref env) = metadata.env {
            metadata_doc.insert("env", env);
        }

        metadata_doc
    }
}

impl ClientMetadata {
    pub(crate) fn new(environment: &Environment) -> Self {
        Self {
            application: None,
            driver: DriverMetadata {
                name: DRIVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            os: OsMetadata {
                os_type: std::env::consts::OS.into(),
                name: None,
                architecture: Some(std::env::consts::ARCH.into()),
                version: None,
            },
            platform: Some(format!(
                "rustc {} with {RUNTIME_NAME}",
                env!("CARGO_PKG_RUST_VERSION")
            )),
            env: RuntimeEnvironment::new(environment),
        }
    }

    pub(crate) fn append_driver_info(&mut self, driver_info: &DriverInfo) {
        self.driver.name.push('|');
        self.driver.name.push_str(&driver_info.name);

        if let Some(ref version) = driver_info.version {
            self.driver.version.push('|');
            self.driver.version.push_str(version);
        }

        if let Some(ref mut platform) = self.platform {
            if let Some(ref driver_info_platform) = driver_info.platform {
                platform.push('|');
                platform.push_str(driver_info_platform);
            }
        }
    }

    fn size(&self) -> Result<usize> {
        bson_util::doc_size_bytes(&Document::from(self))
    }

    /// Drops optional fields until the encoded document fits in [`MAX_CLIENT_METADATA_SIZE`].
    pub(crate) fn truncate_to_fit(&mut self) -> Result<()> {
        let steps: [fn(&mut ClientMetadata); 4] = [
            |metadata| {
                if let Some(ref mut env) = metadata.env {
                    env.keep_only_name();
                }
            },
            |metadata| {
                metadata.os.name = None;
                metadata.os.architecture = None;
                metadata.os.version = None;
            },
            |metadata| metadata.env = None,
            |metadata| metadata.platform = None,
        ];

        for step in steps {
            if self.size()? <= MAX_CLIENT_METADATA_SIZE {
                return Ok(());
            }
            step(self);
        }

        // Only the application name is left to give.
        let excess = self.size()?.saturating_sub(MAX_CLIENT_METADATA_SIZE);
        if excess > 0 {
            if let Some(ref mut application) = self.application {
                let mut keep = application.name.len().saturating_sub(excess);
                while !application.name.is_char_boundary(keep) {
                    keep -= 1;
                }
                application.name.truncate(keep);
            }
        }
        Ok(())
    }
}

/// The parts of [`ClientOptions`] the handshake reads.
#[derive(Clone, Debug, Default)]
pub(crate) struct HandshakerOptions {
    pub(crate) app_name: Option<String>,
    pub(crate) compressors: Option<Vec<Compressor>>,
    pub(crate) driver_info: Option<DriverInfo>,
    pub(crate) server_api: Option<ServerApi>,
    pub(crate) load_balanced: bool,
}

impl From<&ClientOptions> for HandshakerOptions {
    fn from(options: &ClientOptions) -> Self {
        Self {
            app_name: options.app_name.clone(),
            compressors: options.compressors.clone(),
            driver_info: options.driver_info.clone(),
            server_api: options.server_api.clone(),
            load_balanced: options.load_balanced.unwrap_or(false),
        }
    }
}

/// Contains the logic needed to handshake a connection and to check on the server afterwards.
///
/// A [`Deployment`](crate::Deployment) runs [`Handshaker::handshake`] on every connection it
/// opens before handing it to the client. Its monitors run [`Handshaker::check`] on their own
/// handshaked connections.
#[derive_where(Debug)]
pub struct Handshaker {
    /// The hello to send when handshaking. This will always be identical given the same
    /// options, so it can be created at the time the Handshaker is created.
    hello: Hello,
    server_api: Option<ServerApi>,
    load_balanced: bool,
    compressors: Vec<Compressor>,
    #[derive_where(skip)]
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl Handshaker {
    /// Creates a handshaker for connections of a client configured with `options`.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        Self::with_environment(
            HandshakerOptions::from(options),
            options.authenticator.clone(),
            &Environment::capture(),
        )
    }

    pub(crate) fn with_environment(
        options: HandshakerOptions,
        authenticator: Option<Arc<dyn Authenticator>>,
        environment: &Environment,
    ) -> Result<Self> {
        let mut metadata = ClientMetadata::new(environment);
        if let Some(app_name) = options.app_name {
            metadata.application = Some(AppMetadata { name: app_name });
        }
        if let Some(ref driver_info) = options.driver_info {
            metadata.append_driver_info(driver_info);
        }
        metadata.truncate_to_fit()?;

        let compressors = options.compressors.unwrap_or_default();
        for compressor in &compressors {
            compressor.validate()?;
        }

        let mut hello = Hello::new(options.server_api.clone(), options.load_balanced);
        hello.client_metadata = Some(Document::from(&metadata));
        hello.compressors = compressors.iter().map(|c| c.name().to_string()).collect();
        hello.sasl_supported_mechs = authenticator
            .as_ref()
            .and_then(|authenticator| authenticator.sasl_supported_mechs());

        Ok(Self {
            hello,
            server_api: options.server_api,
            load_balanced: options.load_balanced,
            compressors,
            authenticator,
        })
    }

    /// Runs the hello exchange on `conn` and authenticates it. Afterwards the connection knows
    /// the server's limits and the negotiated compressor.
    pub async fn handshake(&self, conn: &mut Connection) -> Result<()> {
        self.handshake_with_reply(conn).await.map(|_| ())
    }

    pub(crate) async fn handshake_with_reply(&self, conn: &mut Connection) -> Result<HelloReply> {
        let mut hello = self.hello.clone();
        hello.speculative_authenticate = self
            .authenticator
            .as_ref()
            .and_then(|authenticator| authenticator.speculative_authenticate());

        let reply = run_hello(conn, &hello.command()?).await?;
        conn.stream_description = Some(StreamDescription::from_hello_reply(&reply));
        conn.compressor = reply
            .command_response
            .compressors
            .as_deref()
            .and_then(|server| compression::negotiate(&self.compressors, server));
        conn.speculative_authenticate = reply.command_response.speculative_authenticate.clone();

        if let Some(ref authenticator) = self.authenticator {
            let speculative = conn.speculative_authenticate.take();
            authenticator.authenticate(conn, speculative).await?;
        }

        Ok(reply)
    }

    /// Runs a monitoring `hello` on a handshaked connection and describes the server from the
    /// reply.
    ///
    /// The command is `hello` if the handshake negotiated it and legacy hello otherwise. With
    /// `awaitable` set the check becomes a streaming one: the server keeps sending replies, which
    /// are read with [`Handshaker::next_check`] while [`Connection::is_streaming`] holds.
    pub async fn check(
        &self,
        conn: &mut Connection,
        awaitable: Option<AwaitableHelloOptions>,
    ) -> Result<ServerDescription> {
        let hello_ok = conn.stream_description()?.hello_ok;
        let mut command = hello_command(
            self.server_api.as_ref(),
            Some(self.load_balanced),
            Some(hello_ok),
            awaitable,
        )?;
        // Handshaked connections always speak OP_MSG.
        command.legacy = false;

        let start = Instant::now();
        let reply = run_hello(conn, &command).await?;
        let round_trip_time = awaitable.is_none().then(|| start.elapsed());
        Ok(ServerDescription::from_hello_reply(reply, round_trip_time))
    }

    /// Waits for the next reply of a streaming check started by [`Handshaker::check`].
    pub async fn next_check(&self, conn: &mut Connection) -> Result<ServerDescription> {
        let reply = conn.receive_streamed().await?.into_hello_reply()?;
        Ok(ServerDescription::from_hello_reply(reply, None))
    }

    #[cfg(test)]
    pub(crate) fn hello(&self) -> &Hello {
        &self.hello
    }
}
