//! Project Haystack data model and client.
//!
//! [`Value`] and [`Grid`] mirror the server's self-describing result
//! format; [`HaystackClient`] is the capability the datasource talks to,
//! with [`HttpClient`] as the REST implementation.

pub mod client;
pub mod error;
pub mod grid;
pub mod http;
pub mod json;
mod scram;
pub mod value;
pub mod zinc;

pub use client::{ClientFuture, HaystackClient};
pub use error::{ClientError, DecodeError};
pub use grid::{Col, Grid, GridBuilder, Row};
pub use http::{HttpClient, HttpClientConfig};
pub use value::{DateTime, Dict, Number, Ref, Value};
