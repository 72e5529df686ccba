//! Target database access
//!
//! Two traits split the database into what can be read from its catalog and
//! what the engine does to it:
//!
//! - [`CatalogReader`]: tables, columns, primary keys, foreign keys, indexes
//! - [`TargetDatabase`]: key maxima, orphan/null counts, statement execution,
//!   audit log and trigger DDL, audit log reads
//!
//! ## Features
//!
//! - `postgres` (default) - [`PostgresCatalog`] over tokio-postgres, optional TLS
//!
//! [`MockDatabase`] is always available for tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use refaudit_catalog::{CatalogReader, PostgresCatalog};
//!
//! let catalog = PostgresCatalog::connect(&config.connection).await?;
//! let shape = catalog.table_shape("orders").await?;
//! ```

pub mod adapter;
pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use adapter::{CatalogError, CatalogReader, TargetDatabase};
pub use mock::{row, MockDatabase, MockDatabaseBuilder, MockRow, MockTable};
#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalog;
