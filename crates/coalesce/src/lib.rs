//! # coalesce
//!
//! A request-deduplication and batching overlay for collection-oriented
//! backend services. Many concurrent single-key lookups become few bulk
//! queries, identical logical requests are served once, and lookups compose
//! by alternate key, one-to-many fan-out and field projection without
//! re-issuing backend calls.
//!
//! ## How it fits together
//!
//! - A [`CollectionService`] is the external backend: `get(id)` / `find(query)`
//!   style reads over JSON records.
//! - A [`ServiceLoader`] fronts one collection. Every call is normalized into
//!   a [`LoaderRequest`], keyed canonically, memoized in a pluggable
//!   [`CacheStore`], and — for load-style calls — coalesced with concurrent
//!   lookups of the same shape into one bulk read.
//! - An [`AppLoader`] hands out one loader per registered collection.
//!
//! ## Quick start
//!
//! ```no_run
//! use coalesce::{AppLoader, CollectionService};
//! use std::sync::Arc;
//!
//! # async fn example(posts: Arc<dyn CollectionService>) -> coalesce::LoaderResult<()> {
//! let app = AppLoader::builder().register("posts", posts).build();
//! let loader = app.service("posts")?;
//!
//! // These two resolve through one bulk read when issued concurrently.
//! let (a, b) = tokio::join!(loader.load(1, None), loader.load(2, None));
//!
//! // Alternate keys, fan-out and projection compose off the same cache.
//! let by_author = loader.multi("authorId").load(9, None).await?;
//! let trimmed = loader.select(["body"]).load(1, None).await?;
//! # let (_, _, _, _) = (a, b, by_author, trimmed);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod builder;
pub mod error;
pub mod keys;
pub mod loader;
pub mod params;
pub mod projection;
pub mod request;
pub mod results;
pub mod service;
pub mod store;

mod groups;

pub use app::{AppLoader, AppLoaderBuilder, ServiceConfig};
pub use builder::QueryBuilder;
pub use error::{LoaderError, LoaderResult};
pub use keys::stable_stringify;
pub use loader::{ServiceLoader, ServiceLoaderOptions};
pub use params::{default_cache_params, CacheParamsFn, Params};
pub use request::{LoaderRequest, RequestKind};
pub use service::{CollectionService, ServiceCall};
pub use store::{CacheStore, MemoryStore};

pub use coalesce_batch::{BatchError, BatchFetcher, BatchOptions, Batcher};
