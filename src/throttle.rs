//! Process-wide token-bucket throttling keyed by realm.
//!
//! A realm is a throttle-sharing scope. It defaults to a request's scheme + host
//! and can be overridden so several hosts draw from one budget (one realm per
//! logical API). Buckets are created on first use and never removed; the
//! [`ThrottleRegistry::reset`] hook exists so tests can start from a clean slate.

// crates.io
use tokio::time::Instant;
// self
use crate::_prelude::*;

const MIN_REFILL_PER_SECOND: f64 = 1e-6;

/// Per-request throttle configuration.
///
/// The first request to touch a realm creates its bucket with this capacity and
/// refill rate; later requests naming the same realm share the existing budget
/// unchanged.
#[derive(Clone, Debug)]
pub struct ThrottlePolicy {
	realm: Option<String>,
	capacity: u32,
	refill_per_second: f64,
}
impl ThrottlePolicy {
	/// Creates a policy with an explicit bucket capacity and refill rate.
	///
	/// Non-positive rates are clamped to a tiny positive value so a bucket can
	/// never deadlock its callers.
	pub fn new(capacity: u32, refill_per_second: f64) -> Self {
		Self {
			realm: None,
			capacity: capacity.max(1),
			refill_per_second: refill_per_second.max(MIN_REFILL_PER_SECOND),
		}
	}

	/// Creates a policy admitting roughly `rate` requests per second.
	pub fn per_second(rate: f64) -> Self {
		Self::new(rate.ceil().max(1.0) as u32, rate)
	}

	/// Overrides the realm, sharing this budget across every request naming it.
	pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
		self.realm = Some(realm.into());

		self
	}

	/// Explicit realm override, if any.
	pub fn realm(&self) -> Option<&str> {
		self.realm.as_deref()
	}
}

#[derive(Debug)]
struct TokenBucket {
	capacity: f64,
	tokens: f64,
	refill_per_second: f64,
	last_refill: Instant,
}
impl TokenBucket {
	fn new(policy: &ThrottlePolicy, now: Instant) -> Self {
		let capacity = f64::from(policy.capacity);

		Self { capacity, tokens: capacity, refill_per_second: policy.refill_per_second, last_refill: now }
	}

	fn refill(&mut self, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

		self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
		self.last_refill = now;
	}

	// Wait until one token has accrued, assuming no other consumer.
	fn wait_for_one(&self) -> Duration {
		Duration::seconds_f64((1.0 - self.tokens) / self.refill_per_second)
	}
}

/// Registry of per-realm token buckets shared by every request through one client.
///
/// Refill and consume run under each bucket's mutex, so concurrent callers on
/// the same realm can never over-admit; callers on distinct realms never contend
/// beyond the brief registry lookup.
#[derive(Debug, Default)]
pub struct ThrottleRegistry {
	buckets: Mutex<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}
impl ThrottleRegistry {
	/// Acquires one admission token for the realm, sleeping until one is available.
	///
	/// Returns the total time this call spent waiting; zero when a token was free.
	/// Only the calling task is suspended.
	pub async fn acquire(&self, realm: &str, policy: &ThrottlePolicy) -> Duration {
		let bucket = {
			let mut buckets = self.buckets.lock();

			buckets
				.entry(realm.to_owned())
				.or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(policy, Instant::now()))))
				.clone()
		};
		let mut waited = Duration::ZERO;

		loop {
			let wait = {
				let mut guard = bucket.lock();

				guard.refill(Instant::now());

				if guard.tokens >= 1.0 {
					guard.tokens -= 1.0;

					return waited;
				}

				guard.wait_for_one()
			};

			tokio::time::sleep(std_duration(wait)).await;

			waited += wait;
		}
	}

	/// Number of realms with a live bucket.
	pub fn realm_count(&self) -> usize {
		self.buckets.lock().len()
	}

	/// Drops every bucket. Test hook; never called by the pipeline itself.
	pub fn reset(&self) {
		self.buckets.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn first_capacity_acquisitions_are_free() {
		let registry = ThrottleRegistry::default();
		let policy = ThrottlePolicy::new(3, 2.0);

		for _ in 0..3 {
			let waited = registry.acquire("https://api.example.com", &policy).await;

			assert_eq!(waited, Duration::ZERO);
		}

		let waited = registry.acquire("https://api.example.com", &policy).await;

		// One token accrues after 1/R = 0.5 s.
		assert!(waited >= Duration::milliseconds(499));
		assert!(waited <= Duration::milliseconds(510));
	}

	#[tokio::test(start_paused = true)]
	async fn realms_do_not_share_budgets() {
		let registry = ThrottleRegistry::default();
		let policy = ThrottlePolicy::new(1, 1.0);

		assert_eq!(registry.acquire("realm-a", &policy).await, Duration::ZERO);
		assert_eq!(registry.acquire("realm-b", &policy).await, Duration::ZERO);
		assert_eq!(registry.realm_count(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn later_policies_do_not_reconfigure_an_existing_bucket() {
		let registry = ThrottleRegistry::default();
		let narrow = ThrottlePolicy::new(1, 1.0);
		let wide = ThrottlePolicy::new(100, 100.0);

		assert_eq!(registry.acquire("shared", &narrow).await, Duration::ZERO);

		// The realm keeps the first policy's budget: the next token costs ~1 s.
		let waited = registry.acquire("shared", &wide).await;

		assert!(waited >= Duration::milliseconds(999));
	}

	#[tokio::test(start_paused = true)]
	async fn reset_clears_all_buckets() {
		let registry = ThrottleRegistry::default();
		let policy = ThrottlePolicy::new(1, 1.0);

		registry.acquire("realm", &policy).await;

		assert_eq!(registry.realm_count(), 1);

		registry.reset();

		assert_eq!(registry.realm_count(), 0);
		assert_eq!(registry.acquire("realm", &policy).await, Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn refill_caps_at_capacity() {
		let registry = ThrottleRegistry::default();
		let policy = ThrottlePolicy::new(2, 10.0);

		registry.acquire("capped", &policy).await;
		registry.acquire("capped", &policy).await;

		// Idle long enough to refill far beyond capacity; only 2 tokens may exist.
		tokio::time::sleep(std::time::Duration::from_secs(60)).await;

		assert_eq!(registry.acquire("capped", &policy).await, Duration::ZERO);
		assert_eq!(registry.acquire("capped", &policy).await, Duration::ZERO);

		let waited = registry.acquire("capped", &policy).await;

		assert!(waited > Duration::ZERO);
	}
}
