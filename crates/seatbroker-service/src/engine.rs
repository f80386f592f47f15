//! Wiring of every engine service from repositories, coordination
//! primitives, the provider and configuration.

use std::sync::Arc;

use seatbroker_core::config::AppConfig;
use seatbroker_core::traits::{DistributedLock, TeamProvider};
use seatbroker_core::types::Clock;
use seatbroker_coordination::{CoordinationManager, RateLimitRegistry};
use seatbroker_database::Repositories;

use crate::capacity::CapacityGuard;
use crate::code::CodeLedger;
use crate::pool::PoolService;
use crate::provider::ProviderGateway;
use crate::redemption::RedemptionService;
use crate::refresh::RefreshService;
use crate::seat::SeatAllocator;
use crate::switch::SwitchCoordinator;

/// All engine services, constructed once and shared by clone.
#[derive(Debug, Clone)]
pub struct Engine {
    /// Storage.
    pub repos: Repositories,
    /// Seat allocator.
    pub allocator: SeatAllocator,
    /// Capacity guard.
    pub capacity: CapacityGuard,
    /// Code ledger.
    pub ledger: CodeLedger,
    /// Switch coordinator.
    pub switcher: SwitchCoordinator,
    /// Refresh service.
    pub refresher: RefreshService,
    /// Pool maintenance.
    pub pool: PoolService,
    /// Rate-limited request surface.
    pub redemption: RedemptionService,
    /// Provider gateway.
    pub gateway: ProviderGateway,
    /// Distributed lock.
    pub lock: Arc<dyn DistributedLock>,
    /// Injected clock.
    pub clock: Arc<dyn Clock>,
}

impl Engine {
    /// Build the engine.
    pub fn new(
        config: &AppConfig,
        repos: Repositories,
        coordination: &CoordinationManager,
        provider: Arc<dyn TeamProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = &config.engine;
        let gateway = ProviderGateway::new(provider, &config.provider, clock.clone());
        let allocator = SeatAllocator::new(
            repos.seats.clone(),
            repos.mothers.clone(),
            clock.clone(),
            engine.hold_ttl(),
            engine.alive_grace(),
        );
        let capacity = CapacityGuard::new(
            allocator.clone(),
            repos.codes.clone(),
            clock.clone(),
            engine.capacity_warn_threshold,
        );
        let ledger = CodeLedger::new(
            repos.codes.clone(),
            allocator.clone(),
            capacity.clone(),
            gateway.clone(),
            clock.clone(),
            engine.code_length,
            engine.default_code_prefix.clone(),
        );
        let switcher = SwitchCoordinator::new(
            ledger.clone(),
            repos.switches.clone(),
            clock.clone(),
            engine.switch_queue_ttl(),
            engine.switch_claim_lease(),
            engine.recent_team_window(),
        );
        let refresher = RefreshService::new(
            ledger.clone(),
            switcher.clone(),
            clock.clone(),
            engine.refresh_cooldown(),
        );
        let pool = PoolService::new(
            allocator.clone(),
            repos.mothers.clone(),
            gateway.clone(),
            clock.clone(),
        );
        let limits = RateLimitRegistry::new(coordination.limiter(), &config.rate_limits);
        let redemption = RedemptionService::new(
            ledger.clone(),
            switcher.clone(),
            refresher.clone(),
            limits,
        );

        Self {
            repos,
            allocator,
            capacity,
            ledger,
            switcher,
            refresher,
            pool,
            redemption,
            gateway,
            lock: coordination.lock(),
            clock,
        }
    }
}
