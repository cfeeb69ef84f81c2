use crate::{
    Result,
    gql::{
        CHOICE_ENUM_QUERY,
        GraphQlTransport,
    },
    model::{
        Choice,
        normalize_enum_key,
    },
};
use serde::Deserialize;
use std::sync::Mutex;
use tracing::{
    debug,
    warn,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnumTypeDto {
    #[serde(default)]
    enum_values: Vec<EnumValueDto>,
}

#[derive(Deserialize)]
struct EnumValueDto {
    name: Option<String>,
}

/// Finds the declared enum literal for `choice` among `names`.
pub fn map_choice_to_server_enum(choice: Choice, names: &[String]) -> Option<&str> {
    let keys = choice.enum_keys();
    names
        .iter()
        .find(|name| keys.contains(&normalize_enum_key(name).as_str()))
        .map(String::as_str)
}

/// Translates client choices into the application's `Choice` enum literals,
/// caching the declared names after the first successful introspection.
#[derive(Debug, Default)]
pub struct ChoiceMapper {
    names: Mutex<Option<Vec<String>>>,
}

impl ChoiceMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(names: Vec<String>) -> Self {
        Self {
            names: Mutex::new(Some(names)),
        }
    }

    pub fn cached_names(&self) -> Option<Vec<String>> {
        self.names.lock().ok().and_then(|guard| guard.clone())
    }

    fn store_names(&self, names: &[String]) {
        if let Ok(mut guard) = self.names.lock() {
            *guard = Some(names.to_vec());
        }
    }

    /// Introspects the declared names. On failure the cached names (or none)
    /// are returned instead.
    pub async fn load_names<T: GraphQlTransport>(&self, transport: &T) -> Vec<String> {
        match fetch_enum_names(transport).await {
            Ok(names) if !names.is_empty() => {
                debug!(?names, "loaded Choice enum names");
                self.store_names(&names);
                names
            }
            Ok(_) => self.cached_names().unwrap_or_default(),
            Err(err) => {
                warn!(?err, "Choice enum introspection failed");
                self.cached_names().unwrap_or_default()
            }
        }
    }

    async fn names_or_load<T: GraphQlTransport>(&self, transport: &T) -> Vec<String> {
        match self.cached_names() {
            Some(names) => names,
            None => self.load_names(transport).await,
        }
    }

    fn literal_for(choice: Choice, names: &[String]) -> String {
        map_choice_to_server_enum(choice, names)
            .unwrap_or(choice.canonical_name())
            .to_string()
    }

    /// Submits `pickAndReady` with the best known literal. An enum mismatch
    /// triggers one re-introspection and one retry; when the retry fails too
    /// the first error is returned.
    pub async fn submit<T: GraphQlTransport>(
        &self,
        transport: &T,
        choice: Choice,
    ) -> Result<()> {
        let names = self.names_or_load(transport).await;
        let literal = Self::literal_for(choice, &names);
        let first = match transport.execute(&pick_and_ready_mutation(&literal)).await {
            Ok(_) => return Ok(()),
            Err(err) if err.is_unknown_enum_value() => err,
            Err(err) => return Err(err),
        };

        warn!(%literal, error = %first, "Choice literal rejected; refreshing enum names");
        let refreshed = self.load_names(transport).await;
        let retry = Self::literal_for(choice, &refreshed);
        match transport.execute(&pick_and_ready_mutation(&retry)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(literal = %retry, error = %err, "Choice retry failed");
                Err(first)
            }
        }
    }
}

fn pick_and_ready_mutation(literal: &str) -> String {
    format!("mutation {{ pickAndReady(choice: {literal}) }}")
}

async fn fetch_enum_names<T: GraphQlTransport>(transport: &T) -> Result<Vec<String>> {
    let data = transport.execute(CHOICE_ENUM_QUERY).await?;
    let Some(ty) = data.get("__type").filter(|t| !t.is_null()) else {
        return Ok(Vec::new());
    };
    let dto: EnumTypeDto = serde_json::from_value(ty.clone())?;
    Ok(dto
        .enum_values
        .into_iter()
        .filter_map(|v| v.name)
        .filter(|n| !n.is_empty())
        .collect())
}
