use crate::{
    Result,
    gql::{
        GraphQlTransport,
        escape_gql_string,
    },
};
use serde_json::{
    Value,
    json,
};
use std::{
    future::Future,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    warn,
};

const HEIGHT_FIELDS: [&str; 3] = ["height", "blockHeight", "block_height"];

/// A chain notification as delivered by the client SDK. Its shape is owned
/// by the SDK, so every accessor treats it as untrusted JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification(pub Value);

impl Notification {
    pub fn new_block(height: u64) -> Self {
        Notification(json!({ "reason": { "NewBlock": { "height": height } } }))
    }

    fn new_block_reason(&self) -> Option<&Value> {
        self.0
            .get("reason")
            .and_then(|reason| reason.get("NewBlock"))
            .filter(|nb| is_truthy(nb))
    }

    pub fn is_new_block(&self) -> bool {
        self.new_block_reason().is_some()
    }

    /// Block height carried by the notification: a top-level height field
    /// first, then the `reason.NewBlock` payload. Anything else is no height.
    pub fn height(&self) -> Option<u64> {
        if let Some(height) = height_field(&self.0) {
            return Some(height);
        }
        let nb = self.new_block_reason()?;
        parse_height(nb).or_else(|| height_field(nb))
    }
}

fn height_field(value: &Value) -> Option<u64> {
    HEIGHT_FIELDS
        .iter()
        .find_map(|field| value.get(field).and_then(parse_height))
}

fn parse_height(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(h) = n.as_u64() {
                return Some(h);
            }
            let f = n.as_f64()?;
            (f.is_finite() && f >= 0.0).then(|| f.floor() as u64)
        }
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Push channel of chain notifications. `None` means the subscription ended.
pub trait NotificationSource: Send {
    fn next_notification(&mut self) -> impl Future<Output = Option<Notification>> + Send;
}

impl NotificationSource for mpsc::Receiver<Notification> {
    async fn next_notification(&mut self) -> Option<Notification> {
        self.recv().await
    }
}

impl NotificationSource for mpsc::UnboundedReceiver<Notification> {
    async fn next_notification(&mut self) -> Option<Notification> {
        self.recv().await
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TipStateDto {
    next_block_height: Value,
}

/// Watches a chain's tip through the node service and turns every height
/// advance into a `NewBlock` notification.
pub struct NodeHeightPoller<T> {
    transport: T,
    chain_id: String,
    last_height: Option<u64>,
    ticker: time::Interval,
}

impl<T: GraphQlTransport> NodeHeightPoller<T> {
    pub fn new(transport: T, chain_id: impl Into<String>, poll_interval: Duration) -> Self {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        Self {
            transport,
            chain_id: chain_id.into(),
            last_height: None,
            ticker,
        }
    }

    async fn tip_height(&self) -> Result<Option<u64>> {
        let query = format!(
            r#"query {{ chain(chainId: "{}") {{ tipState {{ nextBlockHeight }} }} }}"#,
            escape_gql_string(&self.chain_id)
        );
        let data = self.transport.execute(&query).await?;
        let Some(tip) = data.get("chain").and_then(|c| c.get("tipState")) else {
            return Ok(None);
        };
        let tip: TipStateDto = serde_json::from_value(tip.clone())?;
        // the tip reports the next height to be produced
        Ok(parse_height(&tip.next_block_height).map(|next| next.saturating_sub(1)))
    }
}

impl<T: GraphQlTransport> NotificationSource for NodeHeightPoller<T> {
    async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            self.ticker.tick().await;
            match self.tip_height().await {
                Ok(Some(height)) if self.last_height.is_none_or(|last| height > last) => {
                    self.last_height = Some(height);
                    debug!(chain_id = %self.chain_id, height, "new block observed");
                    return Some(Notification::new_block(height));
                }
                Ok(_) => {}
                Err(err) => warn!(?err, "chain tip poll failed"),
            }
        }
    }
}
