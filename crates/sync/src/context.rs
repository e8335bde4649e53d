//! Per-session application state.
//!
//! Holds what a front end would otherwise keep in ambient globals: who is
//! signed in, the submission awaiting confirmation, and a short-lived
//! service client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::aggregate::Aggregator;
use crate::engine::submit_report;
use crate::error::KpiError;
use crate::locks::RowLocks;
use crate::model::{AggregateReport, ReportPeriod, ReportSubmission, StoreRoster, SubmissionOutcome};
use crate::schema::MetricSchema;
use crate::score::TargetSet;
use crate::service::{ServiceError, SheetService};
use crate::synchronizer::SyncOptions;

pub const DEFAULT_CLIENT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRole {
    /// Signed in with one store's password.
    Store(String),
    Admin,
}

impl AccessRole {
    pub fn can_submit_for(&self, store: &str) -> bool {
        match self {
            Self::Admin => true,
            Self::Store(own) => own == store,
        }
    }

    pub fn can_view_aggregate(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Anonymous,
    SignedIn(AccessRole),
}

type Connector = Box<dyn Fn() -> Result<Arc<dyn SheetService>, ServiceError> + Send + Sync>;

/// Reuses one connected client until it expires or is invalidated.
pub struct ClientCache {
    ttl: Duration,
    connect: Connector,
    slot: Mutex<Option<(Instant, Arc<dyn SheetService>)>>,
}

impl ClientCache {
    pub fn new(ttl: Duration, connect: Connector) -> Self {
        Self {
            ttl,
            connect,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<dyn SheetService>, ServiceError> {
        let mut slot = self.slot.lock();
        if let Some((created, client)) = slot.as_ref() {
            if created.elapsed() < self.ttl {
                return Ok(Arc::clone(client));
            }
            log::debug!("service client expired; reconnecting");
        }
        let client = (self.connect)()?;
        *slot = Some((Instant::now(), Arc::clone(&client)));
        Ok(client)
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

pub struct AppContext {
    schema: MetricSchema,
    root_folder: String,
    options: SyncOptions,
    auth: AuthState,
    pending: Option<ReportSubmission>,
    clients: ClientCache,
    locks: RowLocks,
}

impl AppContext {
    pub fn new<F>(schema: MetricSchema, root_folder: impl Into<String>, connect: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SheetService>, ServiceError> + Send + Sync + 'static,
    {
        Self {
            schema,
            root_folder: root_folder.into(),
            options: SyncOptions::default(),
            auth: AuthState::Anonymous,
            pending: None,
            clients: ClientCache::new(DEFAULT_CLIENT_TTL, Box::new(connect)),
            locks: RowLocks::new(),
        }
    }

    pub fn with_client_ttl(mut self, ttl: Duration) -> Self {
        self.clients.ttl = ttl;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &MetricSchema {
        &self.schema
    }

    pub fn root_folder(&self) -> &str {
        &self.root_folder
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn sign_in(&mut self, role: AccessRole) {
        self.auth = AuthState::SignedIn(role);
    }

    /// Drops the role and any unconfirmed submission.
    pub fn sign_out(&mut self) {
        self.auth = AuthState::Anonymous;
        self.pending = None;
    }

    pub fn can_submit_for(&self, store: &str) -> bool {
        matches!(&self.auth, AuthState::SignedIn(role) if role.can_submit_for(store))
    }

    pub fn can_view_aggregate(&self) -> bool {
        matches!(&self.auth, AuthState::SignedIn(role) if role.can_view_aggregate())
    }

    /// Park a submission for confirmation, replacing any earlier one.
    pub fn stage(&mut self, submission: ReportSubmission) -> Result<(), KpiError> {
        submission.validate()?;
        if !self.can_submit_for(&submission.store) {
            return Err(KpiError::AccessDenied(format!("not signed in for store '{}'", submission.store)));
        }
        self.pending = Some(submission);
        Ok(())
    }

    pub fn pending(&self) -> Option<&ReportSubmission> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<ReportSubmission> {
        self.pending.take()
    }

    pub fn client(&self) -> Result<Arc<dyn SheetService>, KpiError> {
        Ok(self.clients.get()?)
    }

    /// Write the staged submission. The slot is emptied whether or not the
    /// write succeeds.
    pub fn confirm(&mut self) -> Result<SubmissionOutcome, KpiError> {
        let submission = self
            .take_pending()
            .ok_or_else(|| KpiError::Validation("nothing to submit".into()))?;
        if !self.can_submit_for(&submission.store) {
            return Err(KpiError::AccessDenied(format!("not signed in for store '{}'", submission.store)));
        }
        let client = self.client()?;
        let result = submit_report(
            client.as_ref(),
            &self.schema,
            &self.root_folder,
            submission,
            Some(&self.locks),
            self.options,
        );
        self.drop_client_on_auth_failure(&result);
        result
    }

    pub fn aggregate(
        &self,
        stores: &[StoreRoster],
        period: ReportPeriod,
        targets: &BTreeMap<String, TargetSet>,
    ) -> Result<AggregateReport, KpiError> {
        if !self.can_view_aggregate() {
            return Err(KpiError::AccessDenied("the aggregate view needs the admin password".into()));
        }
        let client = self.client()?;
        Ok(Aggregator::new(client.as_ref(), &self.schema, &self.root_folder)
            .with_targets(targets)
            .aggregate(stores, period))
    }

    fn drop_client_on_auth_failure<T>(&self, result: &Result<T, KpiError>) {
        if let Err(KpiError::Remote(ServiceError::Auth(_) | ServiceError::NotAuthenticated)) = result {
            self.clients.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(svc: Arc<MemoryService>) -> AppContext {
        AppContext::new(MetricSchema::builtin(), "root", move || {
            Ok(Arc::clone(&svc) as Arc<dyn SheetService>)
        })
    }

    fn submission(store: &str) -> ReportSubmission {
        let mut metrics = BTreeMap::new();
        metrics.insert("毛利".to_string(), 1000.0);
        ReportSubmission::new(store, "小明", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), metrics)
    }

    #[test]
    fn store_role_limited_to_own_store() {
        let role = AccessRole::Store("東門店".into());
        assert!(role.can_submit_for("東門店"));
        assert!(!role.can_submit_for("西門店"));
        assert!(!role.can_view_aggregate());
        assert!(AccessRole::Admin.can_submit_for("西門店"));
        assert!(AccessRole::Admin.can_view_aggregate());
    }

    #[test]
    fn stage_then_confirm_consumes_submission() {
        let svc = Arc::new(MemoryService::new());
        let wb = svc.add_workbook("2026_01_東門店業績日報表", Some("root"), &["小明"]);
        let mut ctx = context(Arc::clone(&svc));

        assert!(matches!(ctx.stage(submission("東門店")), Err(KpiError::AccessDenied(_))));

        ctx.sign_in(AccessRole::Store("東門店".into()));
        ctx.stage(submission("東門店")).unwrap();
        assert!(ctx.pending().is_some());

        let outcome = ctx.confirm().unwrap();
        assert_eq!(outcome.written("毛利"), Some(1000.0));
        assert!(ctx.pending().is_none());
        assert!(matches!(ctx.confirm(), Err(KpiError::Validation(_))));
        assert_eq!(svc.cell(&wb, "小明", 19, 2), crate::service::CellValue::Number(1000.0));
    }

    #[test]
    fn sign_out_clears_pending() {
        let mut ctx = context(Arc::new(MemoryService::new()));
        ctx.sign_in(AccessRole::Admin);
        ctx.stage(submission("西門店")).unwrap();
        ctx.sign_out();
        assert!(ctx.pending().is_none());
        assert_eq!(ctx.auth(), &AuthState::Anonymous);
    }

    #[test]
    fn aggregate_requires_admin() {
        let mut ctx = context(Arc::new(MemoryService::new()));
        let stores = [StoreRoster::new("東門店", vec![])];
        let period = ReportPeriod::new(2026, 1).unwrap();

        ctx.sign_in(AccessRole::Store("東門店".into()));
        assert!(matches!(ctx.aggregate(&stores, period, &BTreeMap::new()), Err(KpiError::AccessDenied(_))));

        ctx.sign_in(AccessRole::Admin);
        let report = ctx.aggregate(&stores, period, &BTreeMap::new()).unwrap();
        assert_eq!(report.rows.len(), 1);
    }

    #[test]
    fn client_cached_until_ttl() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connects);
        let cache = ClientCache::new(
            Duration::from_secs(60),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryService::new()) as Arc<dyn SheetService>)
            }),
        );
        cache.get().unwrap();
        cache.get().unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        cache.invalidate();
        cache.get().unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        let expired = ClientCache::new(Duration::ZERO, Box::new(|| Err(ServiceError::NotAuthenticated)));
        assert!(expired.get().is_err());
    }
}
