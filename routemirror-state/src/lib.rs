//! Route Mirror State
//!
//! Storage backends for the route mirror. Every backend implements
//! [`routemirror_core::store::MirrorStore`]; [`create_backend`] picks one from
//! a [`BackendConfig`].
//!
//! # Backends
//!
//! - **dynamodb**: a DynamoDB table keyed by `HashKey` (route table id) and
//!   `SortKey` (serialized route key)
//! - **local**: a JSON [`MirrorFile`] on disk, for development and dry runs
//!   against a snapshot
//! - **memory**: an in-process store that starts empty
//!
//! # Example
//!
//! ```ignore
//! use routemirror_state::{create_backend, BackendConfig};
//!
//! let config = BackendConfig::new("dynamodb").with_attribute("table", "route-mirror");
//! let store = create_backend(&config).await?;
//! let rows = store.query_partition("tgw-rtb-0123").await?;
//! ```

pub mod backend;
pub mod backends;
pub mod mirror;

pub use backend::BackendConfig;
pub use backends::{DynamoDbStore, LocalStore, create_backend};
pub use mirror::MirrorFile;
