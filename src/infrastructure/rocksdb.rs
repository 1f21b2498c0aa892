use crate::domain::coupon::{normalize_code, Coupon, RejectionReason};
use crate::domain::payment::{PaymentSession, SessionId};
use crate::domain::ports::{CouponStore, PaymentSessionStore};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing coupons, keyed by uppercase code.
pub const CF_COUPONS: &str = "coupons";
/// Column Family for storing payment sessions, keyed by session id bytes.
pub const CF_SESSIONS: &str = "payment_sessions";

/// A persistent store implementation using RocksDB.
///
/// Handles storage for both `Coupon` and `PaymentSession` entities using
/// separate Column Families, serialized as JSON.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
/// Coupon inserts, redemptions and definition changes go through one shared
/// lock so the read-check-write of a coupon cannot interleave.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    coupon_writes: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_coupons = ColumnFamilyDescriptor::new(CF_COUPONS, Options::default());
        let cf_sessions = ColumnFamilyDescriptor::new(CF_SESSIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_coupons, cf_sessions])?;

        Ok(Self {
            db: Arc::new(db),
            coupon_writes: Arc::default(),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CheckoutError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf: &'static str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl CouponStore for RocksDBStore {
    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        self.read(CF_COUPONS, normalize_code(code).as_bytes())
    }

    async fn store(&self, mut coupon: Coupon) -> Result<()> {
        coupon.code = normalize_code(&coupon.code);
        self.put(CF_COUPONS, coupon.code.as_bytes(), &coupon)
    }

    async fn insert(&self, mut coupon: Coupon) -> Result<()> {
        let _guard = self.coupon_writes.lock().await;
        coupon.code = normalize_code(&coupon.code);
        if self
            .db
            .get_pinned_cf(self.cf(CF_COUPONS)?, coupon.code.as_bytes())?
            .is_some()
        {
            return Err(CheckoutError::DuplicateCoupon(coupon.code));
        }
        self.put(CF_COUPONS, coupon.code.as_bytes(), &coupon)
    }

    async fn replace_definition(&self, mut coupon: Coupon) -> Result<Coupon> {
        let _guard = self.coupon_writes.lock().await;
        coupon.code = normalize_code(&coupon.code);
        let stored: Coupon = self
            .read(CF_COUPONS, coupon.code.as_bytes())?
            .ok_or_else(|| CheckoutError::not_found("coupon", &coupon.code))?;
        coupon.current_uses = stored.current_uses;
        self.put(CF_COUPONS, coupon.code.as_bytes(), &coupon)?;
        Ok(coupon)
    }

    async fn remove(&self, code: &str) -> Result<bool> {
        let key = normalize_code(code);
        let cf = self.cf(CF_COUPONS)?;
        let existed = self.db.get_pinned_cf(cf, key.as_bytes())?.is_some();
        if existed {
            self.db.delete_cf(cf, key.as_bytes())?;
        }
        Ok(existed)
    }

    async fn get_all(&self) -> Result<Vec<Coupon>> {
        self.scan(CF_COUPONS)
    }

    async fn redeem(&self, code: &str) -> Result<Coupon> {
        let _guard = self.coupon_writes.lock().await;
        let key = normalize_code(code);
        let mut coupon: Coupon = self
            .read(CF_COUPONS, key.as_bytes())?
            .ok_or(CheckoutError::CouponRejected(RejectionReason::NotFound))?;
        if coupon.is_exhausted() {
            return Err(CheckoutError::CouponRejected(RejectionReason::UsageExceeded));
        }
        coupon.current_uses += 1;
        self.put(CF_COUPONS, key.as_bytes(), &coupon)?;
        Ok(coupon)
    }
}

#[async_trait]
impl PaymentSessionStore for RocksDBStore {
    async fn store(&self, session: PaymentSession) -> Result<()> {
        self.put(CF_SESSIONS, session.id.as_bytes(), &session)
    }

    async fn get(&self, id: SessionId) -> Result<Option<PaymentSession>> {
        self.read(CF_SESSIONS, id.as_bytes())
    }

    async fn get_all(&self) -> Result<Vec<PaymentSession>> {
        let mut sessions: Vec<PaymentSession> = self.scan(CF_SESSIONS)?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}
