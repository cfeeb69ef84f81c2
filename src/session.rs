use crate::{
    Error,
    Result,
    gql::{
        GraphQlTransport,
        HttpTransport,
    },
};
use rand::Rng;
use serde_json::Value;
use sps_store::{
    KeyValueStore,
    PersistedState,
};
use std::{
    fmt,
    future::Future,
};
use tracing::{
    error,
    info,
};

const SEED_BYTES: usize = 32;

/// Progress of [`Session::establish`], reported as each stage begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitStage {
    PreparingSeed,
    ConnectingChain,
    ConnectingApplication,
    Ready,
    Failed(String),
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStage::PreparingSeed => write!(f, "Preparing wallet seed"),
            InitStage::ConnectingChain => write!(f, "Connecting to chain"),
            InitStage::ConnectingApplication => write!(f, "Connecting to application"),
            InitStage::Ready => write!(f, "Ready"),
            InitStage::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub application_id: String,
    pub matchmaker_chain_id: String,
    pub faucet_url: String,
    /// Use this chain instead of asking the node service for its default.
    pub chain_id: Option<String>,
}

/// Resolves the local chain and checks that the application is served on it.
pub trait ChainConnector: Send + Sync {
    fn default_chain(&self) -> impl Future<Output = Result<String>> + Send;

    fn connect_application(
        &self,
        chain_id: &str,
        application_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`ChainConnector`] backed by a Linera node service.
pub struct NodeServiceConnector {
    node_url: String,
    node: HttpTransport,
}

impl NodeServiceConnector {
    pub fn new(node_url: &str) -> Result<Self> {
        Ok(Self {
            node_url: node_url.trim_end_matches('/').to_string(),
            node: HttpTransport::new(node_url)?,
        })
    }
}

impl ChainConnector for NodeServiceConnector {
    async fn default_chain(&self) -> Result<String> {
        let data = self.node.execute("query { chains { default } }").await?;
        data.pointer("/chains/default")
            .and_then(Value::as_str)
            .filter(|chain| !chain.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Init("node service has no default chain".into()))
    }

    async fn connect_application(&self, chain_id: &str, application_id: &str) -> Result<()> {
        let app = HttpTransport::for_application(&self.node_url, chain_id, application_id)?;
        app.execute("query { __typename }").await?;
        Ok(())
    }
}

/// An established connection: wallet seed, local chain and application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    chain_id: String,
    seed: String,
    application_id: String,
    matchmaker_chain_id: String,
    faucet_url: String,
}

impl Session {
    pub fn new(
        chain_id: impl Into<String>,
        seed: impl Into<String>,
        application_id: impl Into<String>,
        matchmaker_chain_id: impl Into<String>,
        faucet_url: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            seed: seed.into(),
            application_id: application_id.into(),
            matchmaker_chain_id: matchmaker_chain_id.into(),
            faucet_url: faucet_url.into(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn matchmaker_chain_id(&self) -> &str {
        &self.matchmaker_chain_id
    }

    pub fn faucet_url(&self) -> &str {
        &self.faucet_url
    }

    /// Runs the init stages in order. The first failing stage is reported as
    /// [`InitStage::Failed`] and its error returned.
    pub async fn establish<S, C>(
        config: &SessionConfig,
        state: &mut PersistedState<S>,
        connector: &C,
        mut on_stage: impl FnMut(&InitStage),
    ) -> Result<Session>
    where
        S: KeyValueStore,
        C: ChainConnector,
    {
        let mut report = |stage: InitStage| {
            info!(%stage, "session init");
            on_stage(&stage);
        };
        let result = Self::connect(config, state, connector, &mut report).await;
        match &result {
            Ok(session) => {
                info!(chain_id = %session.chain_id, "session ready");
                report(InitStage::Ready);
            }
            Err(err) => {
                error!(%err, "session init failed");
                report(InitStage::Failed(err.to_string()));
            }
        }
        result
    }

    async fn connect<S, C>(
        config: &SessionConfig,
        state: &mut PersistedState<S>,
        connector: &C,
        report: &mut impl FnMut(InitStage),
    ) -> Result<Session>
    where
        S: KeyValueStore,
        C: ChainConnector,
    {
        if config.application_id.trim().is_empty() {
            return Err(Error::Config("application id is not set".into()));
        }

        report(InitStage::PreparingSeed);
        let seed = load_or_create_seed(state)?;

        report(InitStage::ConnectingChain);
        let chain_id = match config.chain_id.as_deref().map(str::trim) {
            Some(chain) if !chain.is_empty() => chain.to_string(),
            _ => connector.default_chain().await?,
        };

        report(InitStage::ConnectingApplication);
        connector
            .connect_application(&chain_id, &config.application_id)
            .await
            .map_err(|err| Error::Init(format!("application unavailable: {err}")))?;

        Ok(Session::new(
            chain_id,
            seed,
            config.application_id.trim(),
            config.matchmaker_chain_id.clone(),
            config.faucet_url.clone(),
        ))
    }
}

/// Returns the persisted seed, generating and storing a fresh one first if
/// none exists.
pub fn load_or_create_seed<S: KeyValueStore>(state: &mut PersistedState<S>) -> Result<String> {
    if let Some(seed) = state.seed()? {
        return Ok(seed);
    }
    let bytes = rand::rng().random::<[u8; SEED_BYTES]>();
    let seed = hex::encode(bytes);
    state.set_seed(&seed)?;
    info!("generated new wallet seed");
    Ok(seed)
}
