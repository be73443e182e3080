//! Declarative HTTP request orchestration—immutable request values wrapped in retry,
//! throttle, cache, and OAuth 2.0 policies around one pluggable transport.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod client;
pub mod error;
pub mod oauth;
pub mod obs;
pub mod request;
pub mod response;
pub mod retry;
pub mod secret;
pub mod throttle;
pub mod transport;

mod perform;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use bytes::Bytes;
	pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};

	/// Converts a non-negative [`Duration`] into the std form used by timers.
	pub(crate) fn std_duration(duration: Duration) -> std::time::Duration {
		if duration.is_negative() {
			return std::time::Duration::ZERO;
		}

		std::time::Duration::new(
			duration.whole_seconds().max(0) as u64,
			duration.subsec_nanoseconds().unsigned_abs(),
		)
	}
}

pub use http;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use time;
pub use url;
#[cfg(test)] use httpmock as _;
