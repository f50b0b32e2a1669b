//! # Database Connections
//!
//! Keyed connection pooling for checks that talk to many logical databases
//! through one connection each. Drivers plug in through [`PooledConnection`]
//! and [`ConnectionFactory`].

pub mod connection_pool;
pub mod errors;

pub use connection_pool::{
    connection_key, ConnectionFactory, ConnectionOptions, ConnectionPool, PoolStats,
    PooledConnection,
};
pub use errors::{ConnectionError, PoolError, PoolResult};
