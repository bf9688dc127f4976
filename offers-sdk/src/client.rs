use async_trait::async_trait;
use offers_core::{
    ApiConfig, AuthenticatedClient, CacheConfig, Headers, Params, Response,
    TokenStore, TransportConfig, create_store,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::types::{Offer, Product, ProductId, Result, SdkError};

/// Operations offered by the Offers API.
///
/// This trait is implemented by [`OffersClient`] and can be mocked for testing.
#[async_trait]
pub trait OffersApi: Send + Sync {
    /// List the offers for a registered product.
    async fn get_offers(&self, product_id: Uuid) -> Result<Vec<Offer>>;

    /// Register a product, generating a UUIDv7 when `id` is `None`.
    async fn register_product(&self, product: &Product, id: Option<Uuid>) -> Result<ProductId>;
}

/// Typed client for the Offers API.
///
/// # Example
///
/// ```no_run
/// use offers_core::{ApiConfig, TransportConfig};
/// use offers_sdk::{OffersApi, OffersClient};
///
/// #[tokio::main]
/// async fn main() -> offers_sdk::Result<()> {
///     let config = ApiConfig::from_env()?;
///     let client = OffersClient::from_config(&config, &TransportConfig::default()).await?;
///
///     for offer in client.get_offers(uuid::Uuid::nil()).await? {
///         println!("{} in stock at {}", offer.items_in_stock, offer.price);
///     }
///     Ok(())
/// }
/// ```
pub struct OffersClient<S: TokenStore = Box<dyn TokenStore>> {
    inner: AuthenticatedClient<S>,
}

impl OffersClient {
    /// Create a client that keeps its token in the OS keyring when one is
    /// available, in memory otherwise.
    pub async fn from_config(config: &ApiConfig, transport: &TransportConfig) -> Result<Self> {
        OffersClientBuilder::new()
            .transport_config(transport.clone())
            .build(config)
            .await
    }

    /// Start building a client.
    pub fn builder() -> OffersClientBuilder {
        OffersClientBuilder::new()
    }
}

impl<S: TokenStore> OffersClient<S> {
    /// Wrap an existing authenticated client.
    pub fn new(inner: AuthenticatedClient<S>) -> Self {
        Self { inner }
    }

    /// The underlying authenticated client.
    pub fn inner(&self) -> &AuthenticatedClient<S> {
        &self.inner
    }
}

#[async_trait]
impl<S: TokenStore> OffersApi for OffersClient<S> {
    async fn get_offers(&self, product_id: Uuid) -> Result<Vec<Offer>> {
        let endpoint = format!("products/{}/offers", product_id);
        let response = self
            .inner
            .get(&endpoint, &Params::new(), &Headers::new())
            .await
            .map_err(SdkError::from)?;

        debug!(
            product_id = %product_id,
            from_cache = response.is_from_cache(),
            "Fetched offers"
        );
        decode(validate(response)?)
    }

    async fn register_product(&self, product: &Product, id: Option<Uuid>) -> Result<ProductId> {
        let id = id.unwrap_or_else(Uuid::now_v7);
        let body = json!({
            "name": product.name,
            "description": product.description,
            "id": id.to_string(),
        });

        let response = self
            .inner
            .post("products/register", Some(&body), &Headers::new())
            .await
            .map_err(SdkError::from)?;

        if response.status().as_u16() == 409 {
            return Err(SdkError::Validation(format!(
                "Product with ID {} already exists",
                id
            )));
        }

        debug!(product_id = %id, "Registered product");
        decode(validate(response)?)
    }
}

/// Builder for configuring an [`OffersClient`].
pub struct OffersClientBuilder {
    transport: TransportConfig,
    prefer_keyring: bool,
    store: Option<Box<dyn TokenStore>>,
}

impl OffersClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            transport: TransportConfig::default(),
            prefer_keyring: true,
            store: None,
        }
    }

    /// Set the transport configuration.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    /// Disable the response cache.
    pub fn no_cache(mut self) -> Self {
        self.transport.cache = CacheConfig::disabled();
        self
    }

    /// Keep the access token in memory only.
    pub fn memory_store(mut self) -> Self {
        self.prefer_keyring = false;
        self
    }

    /// Use a specific token store.
    pub fn store(mut self, store: Box<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the client.
    pub async fn build(self, config: &ApiConfig) -> Result<OffersClient> {
        let store = self
            .store
            .unwrap_or_else(|| create_store(self.prefer_keyring));
        let inner = AuthenticatedClient::from_config(config, &self.transport, store)
            .await
            .map_err(SdkError::from)?;
        Ok(OffersClient::new(inner))
    }
}

impl Default for OffersClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a non-success response to the matching [`SdkError`].
pub(crate) fn validate(response: Response) -> Result<Response> {
    let status = response.status().as_u16();
    match status {
        _ if response.is_success() => Ok(response),
        401 => Err(SdkError::authentication("Check refresh token")),
        422 => Err(SdkError::Validation(
            "Malformed authentication request".to_string(),
        )),
        500.. => Err(SdkError::Server {
            status,
            body: response.body().clone(),
        }),
        _ => Err(SdkError::Unexpected {
            status,
            body: response.body().clone(),
        }),
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(response.json_as()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn status(code: u16) -> Response {
        Response::from_bytes(code.try_into().unwrap(), br#"{"detail":"x"}"#)
    }

    #[test]
    fn test_validate_success_passes_through() {
        assert!(validate(status(201)).is_ok());
    }

    #[test]
    fn test_validate_maps_statuses() {
        assert!(matches!(
            validate(status(401)),
            Err(SdkError::Authentication { refresh: None, .. })
        ));
        assert!(matches!(validate(status(422)), Err(SdkError::Validation(_))));
        assert!(matches!(
            validate(status(503)),
            Err(SdkError::Server { status: 503, .. })
        ));
        assert!(matches!(
            validate(status(404)),
            Err(SdkError::Unexpected { status: 404, .. })
        ));
    }

    #[test]
    fn test_decode_reports_invalid_body() {
        let result: Result<Vec<Offer>> = decode(status(200));
        assert!(matches!(result, Err(SdkError::InvalidBody(_))));

        let body: Value = decode(status(200)).unwrap();
        assert_eq!(body["detail"], "x");
    }
}
