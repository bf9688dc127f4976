//! Offers SDK
//!
//! A typed client for the Offers API, built on the authenticated transport in
//! `offers-core`.
//!
//! # Features
//!
//! - **Offers lookup**: `get_offers` lists the offers for a product
//! - **Product registration**: `register_product`, generating a UUIDv7 id when none is given
//! - **Error classification**: responses map onto authentication, validation,
//!   server and unexpected errors
//! - **Token lifecycle**: access tokens are refreshed and persisted by the
//!   underlying [`AuthenticatedClient`](offers_core::AuthenticatedClient)
//!
//! # Quick Start
//!
//! ```no_run
//! use offers_core::ApiConfig;
//! use offers_sdk::{OffersApi, OffersClient, Product};
//!
//! #[tokio::main]
//! async fn main() -> offers_sdk::Result<()> {
//!     let config = ApiConfig::from_env()?;
//!     let client = OffersClient::builder().memory_store().build(&config).await?;
//!
//!     let product = Product::new("Widget", "A very useful widget");
//!     let id = client.register_product(&product, None).await?;
//!     let offers = client.get_offers(id.id).await?;
//!     println!("{} offers", offers.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! [`ApiConfig::from_env`](offers_core::ApiConfig::from_env) reads:
//! - `OFFERS_API_BASE_URL`
//! - `AUTH_ENDPOINT`
//! - `REFRESH_TOKEN`
//! - `PERSISTENT_TOKEN_KEY`

mod client;
pub mod types;

// Re-export main types from client module
pub use client::{OffersApi, OffersClient, OffersClientBuilder};

pub use types::{Offer, Product, ProductId, Result, SdkError};
