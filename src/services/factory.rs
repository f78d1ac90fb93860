use std::sync::Arc;

use crate::{
    circuit_breaker::CircuitBreaker,
    config::AppConfig,
    db::DbPool,
    services::{
        admin_settings::AdminSettingsService,
        exceptions::ExceptionService,
        external_data::ExternalDataService,
        mo_cache::{MoCacheConfig, MoCacheService, MoSyncSchedule, MoSyncScheduler},
        mo_completion::MoCompletionService,
        notifier::{EndpointResolver, HttpStatusNotifier, NotifierError, StatusNotifier},
        pic::PicService,
        receiver::ReceiverService,
        reports::ReportService,
    },
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    config: AppConfig,
    breaker: Arc<CircuitBreaker>,
    http_notifier: HttpStatusNotifier,
    status_notifier: Arc<dyn StatusNotifier>,
}

impl ServiceFactory {
    /// Wires the HTTP notifier and its circuit breaker from configuration.
    pub fn new(db_pool: Arc<DbPool>, config: AppConfig) -> Result<Self, NotifierError> {
        let breaker = Arc::new(CircuitBreaker::new(
            config.circuit_breaker_failure_threshold,
            config.circuit_breaker_timeout(),
            config.circuit_breaker_success_threshold,
        ));
        let http_notifier = HttpStatusNotifier::new(config.notifier_timeout(), breaker.clone())?;
        let status_notifier: Arc<dyn StatusNotifier> = Arc::new(http_notifier.clone());
        Ok(Self {
            db_pool,
            config,
            breaker,
            http_notifier,
            status_notifier,
        })
    }

    /// Replaces the status sink, keeping the HTTP notifier for MO list publishing.
    pub fn with_status_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.status_notifier = notifier;
        self
    }

    pub fn settings(&self) -> AdminSettingsService {
        AdminSettingsService::new(self.db_pool.clone())
    }

    pub fn resolver(&self) -> EndpointResolver {
        EndpointResolver::new(self.settings(), self.config.external_api_url.clone())
    }

    pub fn mo_cache(&self) -> MoCacheService {
        MoCacheService::new(
            self.db_pool.clone(),
            self.settings(),
            MoCacheConfig::from(&self.config),
        )
    }

    pub fn mo_completion(&self) -> MoCompletionService {
        MoCompletionService::new(
            self.db_pool.clone(),
            self.mo_cache(),
            self.resolver(),
            self.status_notifier.clone(),
            self.config.max_range_span,
            self.config.report_utc_offset_hours,
        )
    }

    pub fn mo_sync_scheduler(&self) -> MoSyncScheduler {
        MoSyncScheduler::new(
            self.mo_cache(),
            self.resolver(),
            self.http_notifier.clone(),
            MoSyncSchedule::from(&self.config),
        )
    }

    /// Gets a reference to the database pool
    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub settings: AdminSettingsService,
    pub mo_cache: MoCacheService,
    pub completion: MoCompletionService,
    pub exceptions: ExceptionService,
    pub reports: ReportService,
    pub external: ExternalDataService,
    pub receiver: ReceiverService,
    pub pic: PicService,
    pub scheduler: MoSyncScheduler,
    pub breaker: Arc<CircuitBreaker>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        let db = factory.db_pool().clone();
        let offset = factory.config.report_utc_offset_hours;
        Self {
            settings: factory.settings(),
            mo_cache: factory.mo_cache(),
            completion: factory.mo_completion(),
            exceptions: ExceptionService::new(db.clone()),
            reports: ReportService::new(db.clone(), offset),
            external: ExternalDataService::new(db.clone(), offset),
            receiver: ReceiverService::new(db.clone()),
            pic: PicService::new(db),
            scheduler: factory.mo_sync_scheduler(),
            breaker: factory.breaker().clone(),
        }
    }
}
