//! Command implementations.
//!
//! Each command returns the JSON value to print; `main` owns rendering.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use offers_core::{AuthenticatedClient, TokenStore};
use offers_sdk::{OffersApi, Product, SdkError};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

/// Access-token state as reported by `token-status` and `refresh`.
#[derive(Debug, Serialize, PartialEq)]
pub struct TokenStatus {
    pub persistence_key: Option<String>,
    pub has_token: bool,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenStatus {
    pub fn of<S: TokenStore>(client: &AuthenticatedClient<S>) -> Self {
        let tokens = client.token_manager();
        Self {
            persistence_key: tokens.persistence_key().map(str::to_string),
            has_token: tokens.current_token().is_some(),
            expired: tokens.is_expired(),
            expires_at: tokens.expires_at(),
        }
    }
}

pub async fn get_offers(api: &impl OffersApi, product_id: Uuid) -> Result<Value> {
    let offers = api.get_offers(product_id).await?;
    info!(count = offers.len(), "Fetched offers for {}", product_id);
    Ok(serde_json::to_value(offers)?)
}

pub async fn register_product(
    api: &impl OffersApi,
    name: String,
    description: String,
    id: Option<Uuid>,
) -> Result<Value> {
    let product = Product { name, description };
    let registered = api.register_product(&product, id).await?;
    Ok(serde_json::to_value(registered)?)
}

pub async fn refresh<S: TokenStore>(client: &AuthenticatedClient<S>) -> Result<Value> {
    client
        .refresh()
        .await
        .map_err(SdkError::from)
        .context("Token refresh failed")?;
    Ok(serde_json::to_value(TokenStatus::of(client))?)
}

pub fn token_status<S: TokenStore>(client: &AuthenticatedClient<S>) -> Result<Value> {
    Ok(serde_json::to_value(TokenStatus::of(client))?)
}

pub async fn forget_token<S: TokenStore>(client: &AuthenticatedClient<S>) -> Result<Value> {
    client
        .token_manager()
        .forget()
        .await
        .context("Failed to remove stored access token")?;
    Ok(json!({ "forgotten": client.token_manager().persistence_key() }))
}

pub fn clear_cache<S: TokenStore>(client: &AuthenticatedClient<S>) -> Result<Value> {
    let Some(cache) = client.transport().cache() else {
        return Ok(json!({ "cleared": 0, "cache": "disabled" }));
    };

    let count = cache.clear().context("Failed to clear response cache")?;
    info!(count, "Cleared response cache");
    Ok(json!({ "cleared": count }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use offers_core::{
        MemoryStore, NoopStore, Secret, TokenLifecycleManager, Transport, TransportConfig,
    };
    use offers_sdk::{Offer, ProductId};
    use url::Url;

    use super::*;

    /// Answers every call from fixed data.
    struct StaticApi {
        offers: Vec<Offer>,
    }

    #[async_trait]
    impl OffersApi for StaticApi {
        async fn get_offers(&self, _product_id: Uuid) -> offers_sdk::Result<Vec<Offer>> {
            Ok(self.offers.clone())
        }

        async fn register_product(
            &self,
            _product: &Product,
            id: Option<Uuid>,
        ) -> offers_sdk::Result<ProductId> {
            Ok(ProductId {
                id: id.unwrap_or_default(),
            })
        }
    }

    async fn offline_client<S: TokenStore>(store: S) -> AuthenticatedClient<S> {
        let transport = Transport::new(
            Url::parse("http://127.0.0.1:9/api/v1/").unwrap(),
            "auth",
            &TransportConfig::default(),
        )
        .unwrap();
        let tokens = TokenLifecycleManager::load(store, Some("cli-test".to_string())).await;
        AuthenticatedClient::new(transport, tokens, Secret::new("refresh"))
    }

    #[tokio::test]
    async fn test_get_offers_renders_list() {
        let id = Uuid::nil();
        let api = StaticApi {
            offers: vec![Offer {
                id,
                price: 100,
                items_in_stock: 2,
            }],
        };

        let value = get_offers(&api, id).await.unwrap();

        assert_eq!(value[0]["price"], 100);
        assert_eq!(value[0]["items_in_stock"], 2);
    }

    #[tokio::test]
    async fn test_register_product_renders_id() {
        let api = StaticApi { offers: vec![] };
        let id = Uuid::now_v7();

        let value = register_product(&api, "n".into(), "d".into(), Some(id))
            .await
            .unwrap();

        assert_eq!(
            serde_json::from_value::<ProductId>(value).unwrap(),
            ProductId { id }
        );
    }

    #[tokio::test]
    async fn test_token_status_without_token() {
        let client = offline_client(NoopStore).await;

        let status = TokenStatus::of(&client);

        assert_eq!(
            status,
            TokenStatus {
                persistence_key: Some("cli-test".to_string()),
                has_token: false,
                expired: true,
                expires_at: None,
            }
        );
    }

    #[tokio::test]
    async fn test_forget_token_clears_store() {
        let store = Arc::new(MemoryStore::with_token("cli-test", "not-a-jwt"));
        let client = offline_client(Arc::clone(&store)).await;

        let value = forget_token(&client).await.unwrap();

        assert_eq!(value["forgotten"], "cli-test");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_on_empty_cache() {
        let client = offline_client(NoopStore).await;

        let value = clear_cache(&client).unwrap();

        assert_eq!(value["cleared"], 0);
    }
}
