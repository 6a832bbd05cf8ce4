//! RLZ Client Facade
//!
//! [`RlzClient`] is the only entry point that touches state. Every public
//! operation follows the same shape:
//!
//! 1. take the exclusive lock once through the [`AccessGate`];
//! 2. check the caller's owner (and, for deal code and machine id, the
//!    machine owner) has the access it needs;
//! 3. build the state views it needs from the held guard and run.
//!
//! `send_financial_ping` is the one operation that spans several lock
//! acquisitions: the network round trip runs without the lock held.

use crate::access::file_lock::FileLockGate;
use crate::access::gate::ProcessGate;
use crate::access::{lock, AccessGate, ExclusiveLock};
use crate::config::ClientConfig;
use crate::error::{Result, RlzError};
use crate::model::buffer::CappedString;
use crate::model::types::{AccessPoint, Event, OwnerId, Product};
use crate::ping::protocol::{MAX_CGI_LENGTH, MAX_PING_REQUEST_LENGTH};
use crate::ping::request::{form_request, ping_params, PingRequest};
use crate::ping::response::{plan_response, ResponseDisposition};
use crate::ping::scheduler::{Clock, PingScheduler, SystemClock};
use crate::ping::transport::Transport;
use crate::state::deal::{new_code_from_ping_response, DealCodeStore};
use crate::state::events::EventStore;
use crate::state::rlz::RlzStore;
use crate::state::{
    events_root_key, lib_key, parent_key, ping_times_key, rlzs_key, stateful_events_root_key,
};
use crate::storage::file::FileStore;
use crate::storage::memory::MemoryStore;
use crate::storage::Store;

use std::sync::Arc;

/// Counts of what a ping response changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    pub rlzs_set: usize,
    /// RLZ lines for access points this platform does not support.
    pub rlzs_unsupported: usize,
    pub events_cleared: usize,
    pub stateful_events_recorded: usize,
    pub deal_code_updated: bool,
    /// Lines skipped while tokenizing.
    pub skipped_lines: usize,
    /// Individual writes that failed; the rest of the response was still applied.
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    /// The response carried nothing but its checksum.
    EmptyAccepted,
    Applied(AppliedChanges),
}

#[derive(Clone)]
pub struct RlzClient {
    store: Arc<dyn Store>,
    gate: Arc<dyn AccessGate>,
    clock: Arc<dyn Clock>,
}

impl RlzClient {
    pub fn new(store: Arc<dyn Store>, gate: Arc<dyn AccessGate>) -> Self {
        Self {
            store,
            gate,
            clock: Arc::new(SystemClock),
        }
    }

    /// In-process client backed by memory. Nothing persists.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(ProcessGate::default()))
    }

    /// File-backed client guarded by a cross-process lock file.
    pub fn from_config(config: &ClientConfig) -> Self {
        let store = FileStore::new(config.store_dir.clone());
        let gate = FileLockGate::new(config.store_dir.clone(), config.lock_timeout());
        Self::new(Arc::new(store), Arc::new(gate))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock_for(&self, owner: &OwnerId, write: bool) -> Result<ExclusiveLock<'_>> {
        let guard = lock(self.gate.as_ref())?;
        guard.require_access(owner, write)?;
        Ok(guard)
    }

    // ============================================================
    // EVENTS
    // ============================================================

    pub fn record_product_event(
        &self,
        product: Product,
        point: AccessPoint,
        event: Event,
        owner: &OwnerId,
    ) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        EventStore::new(self.store.as_ref(), owner, &guard).record(product, point, event)
    }

    pub fn record_stateful_event(
        &self,
        product: Product,
        point: AccessPoint,
        event: Event,
        owner: &OwnerId,
    ) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        EventStore::new(self.store.as_ref(), owner, &guard).record_stateful(product, point, event)
    }

    pub fn clear_product_event(
        &self,
        product: Product,
        point: AccessPoint,
        event: Event,
        owner: &OwnerId,
    ) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        EventStore::new(self.store.as_ref(), owner, &guard).clear(product, point, event)
    }

    pub fn product_events_as_cgi(
        &self,
        product: Product,
        owner: &OwnerId,
        out: &mut CappedString,
    ) -> Result<()> {
        out.clear();
        let guard = self.lock_for(owner, false)?;
        EventStore::new(self.store.as_ref(), owner, &guard).as_cgi(product, out)
    }

    pub fn clear_all_product_events(&self, product: Product, owner: &OwnerId) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        EventStore::new(self.store.as_ref(), owner, &guard).clear_all(product)
    }

    // ============================================================
    // RLZ
    // ============================================================

    /// Stored RLZ of `point`, or `None` if unset or unsupported.
    pub fn access_point_rlz(&self, point: AccessPoint, owner: &OwnerId) -> Result<Option<String>> {
        let guard = self.lock_for(owner, false)?;
        RlzStore::new(self.store.as_ref(), owner, &guard).get(point)
    }

    pub fn set_access_point_rlz(&self, point: AccessPoint, value: &str, owner: &OwnerId) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        RlzStore::new(self.store.as_ref(), owner, &guard).set(point, value)
    }

    // ============================================================
    // DEAL CODE
    // ============================================================

    pub fn set_machine_deal_code(&self, dcc: &str) -> Result<()> {
        let guard = self.lock_for(&OwnerId::machine(), true)?;
        DealCodeStore::new(self.store.as_ref(), &guard).set(dcc)
    }

    pub fn machine_deal_code(&self) -> Result<Option<String>> {
        let guard = self.lock_for(&OwnerId::machine(), false)?;
        DealCodeStore::new(self.store.as_ref(), &guard).get()
    }

    pub fn machine_deal_code_as_cgi(&self, out: &mut CappedString) -> Result<()> {
        out.clear();
        let guard = self.lock_for(&OwnerId::machine(), false)?;
        DealCodeStore::new(self.store.as_ref(), &guard).as_cgi(out)
    }

    /// Applies a `set_dcc` from a validated response. Returns whether the
    /// stored code changed.
    pub fn set_machine_deal_code_from_ping_response(&self, response: &str) -> Result<bool> {
        let guard = self.lock_for(&OwnerId::machine(), true)?;
        apply_deal_code(&DealCodeStore::new(self.store.as_ref(), &guard), response)
    }

    /// The new deal code a response carries, without storing it.
    pub fn new_deal_code_from_ping_response(&self, response: &str) -> Result<Option<String>> {
        let guard = self.lock_for(&OwnerId::machine(), false)?;
        let stored = DealCodeStore::new(self.store.as_ref(), &guard).get()?;
        new_code_from_ping_response(response, stored.as_deref())
    }

    /// Persistent machine id, generated on first call.
    pub fn machine_id(&self) -> Result<String> {
        let guard = self.lock_for(&OwnerId::machine(), true)?;
        DealCodeStore::new(self.store.as_ref(), &guard).machine_id()
    }

    // ============================================================
    // PING
    // ============================================================

    /// Writes `rep=2&rlz=...[&dcc=...]` for `points` into `out`.
    pub fn ping_params(
        &self,
        points: &[AccessPoint],
        owner: &OwnerId,
        out: &mut CappedString,
    ) -> Result<()> {
        out.reset()?;
        let guard = self.lock_for(owner, false)?;
        let params = self.collect_ping_params(&guard, points, owner)?;
        out.fill(&params)
    }

    /// Writes the full request path for a financial ping into `out`.
    ///
    /// Fails with `BufferTooSmall` and leaves `out` empty when the events or
    /// the ping params exceed `MAX_CGI_LENGTH`, or the path does not fit `out`.
    pub fn form_ping_request(
        &self,
        product: Product,
        request: &PingRequest,
        owner: &OwnerId,
        out: &mut CappedString,
    ) -> Result<()> {
        out.reset()?;
        if request.signature.is_empty() {
            return Err(RlzError::InvalidArgument("product signature is required"));
        }
        let guard = self.lock_for(owner, false)?;

        let mut events_cgi = CappedString::with_capacity(MAX_CGI_LENGTH + 1);
        let has_events = match EventStore::new(self.store.as_ref(), owner, &guard)
            .as_cgi(product, &mut events_cgi)
        {
            Ok(()) => true,
            Err(RlzError::NotFound) => false,
            Err(err) => return Err(err),
        };

        // Nothing pending: report every RLZ we hold.
        let points: Vec<AccessPoint> = if has_events {
            request.points.clone()
        } else {
            AccessPoint::supported().collect()
        };
        let mut params = CappedString::with_capacity(MAX_CGI_LENGTH + 1);
        params.fill(&self.collect_ping_params(&guard, &points, owner)?)?;

        let machine_id = if request.exclude_machine_id {
            None
        } else {
            self.machine_id_locked(&guard)
        };

        let path = form_request(
            request,
            machine_id.as_deref(),
            has_events.then(|| events_cgi.as_str()),
            params.as_str(),
        )?;
        out.fill(&path)
    }

    pub fn is_ping_time(&self, product: Product, owner: &OwnerId, skip_throttle: bool) -> Result<bool> {
        let guard = self.lock_for(owner, false)?;
        self.scheduler(owner, &guard).is_ping_time(product, skip_throttle)
    }

    pub fn update_last_ping_time(&self, product: Product, owner: &OwnerId) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        self.scheduler(owner, &guard).update_last_ping_time(product)
    }

    pub fn clear_last_ping_time(&self, product: Product, owner: &OwnerId) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        self.scheduler(owner, &guard).clear_last_ping_time(product)
    }

    /// Validates a response and applies it.
    ///
    /// A response that fails the checksum gate is rejected without any
    /// change. Past the gate, each line is applied independently.
    pub fn parse_ping_response(
        &self,
        product: Product,
        response: &str,
        owner: &OwnerId,
    ) -> Result<PingOutcome> {
        let guard = self.lock_for(owner, true)?;

        let plan = match plan_response(response) {
            ResponseDisposition::Rejected(err) => {
                tracing::warn!("Rejected ping response for {}: {}", product, err);
                return Err(err);
            }
            ResponseDisposition::EmptyAccepted => return Ok(PingOutcome::EmptyAccepted),
            ResponseDisposition::Applied(plan) => plan,
        };

        let rlz = RlzStore::new(self.store.as_ref(), owner, &guard);
        let events = EventStore::new(self.store.as_ref(), owner, &guard);
        let mut changes = AppliedChanges {
            skipped_lines: plan.skipped_lines,
            ..AppliedChanges::default()
        };

        for update in &plan.rlz_updates {
            if !update.point.is_supported() {
                changes.rlzs_unsupported += 1;
                continue;
            }
            match rlz.set(update.point, &update.value) {
                Ok(()) => changes.rlzs_set += 1,
                Err(err) => {
                    tracing::warn!("Failed to set RLZ for {}: {}", update.point, err);
                    changes.failures += 1;
                }
            }
        }

        for token in &plan.cleared_events {
            match events.clear(product, token.point, token.event) {
                Ok(()) => changes.events_cleared += 1,
                Err(err) => {
                    tracing::warn!("Failed to clear event {}: {}", token, err);
                    changes.failures += 1;
                }
            }
        }

        for token in &plan.stateful_events {
            match events.record_stateful(product, token.point, token.event) {
                Ok(()) => changes.stateful_events_recorded += 1,
                Err(err) => {
                    tracing::warn!("Failed to record stateful event {}: {}", token, err);
                    changes.failures += 1;
                }
            }
        }

        if guard.has_access(&OwnerId::machine(), true) {
            match apply_deal_code(&DealCodeStore::new(self.store.as_ref(), &guard), response) {
                Ok(updated) => changes.deal_code_updated = updated,
                Err(err) => {
                    tracing::warn!("Failed to apply deal code: {}", err);
                    changes.failures += 1;
                }
            }
        } else {
            tracing::debug!("No machine write access, deal code left as is");
        }

        tracing::info!(
            "Applied ping response for {}: {} rlz, {} cleared, {} stateful, {} failures",
            product,
            changes.rlzs_set,
            changes.events_cleared,
            changes.stateful_events_recorded,
            changes.failures
        );
        Ok(PingOutcome::Applied(changes))
    }

    /// Records the ping time, then parses. The time is updated even if the
    /// response is rejected.
    pub fn parse_financial_ping_response(
        &self,
        product: Product,
        response: &str,
        owner: &OwnerId,
    ) -> Result<PingOutcome> {
        self.update_last_ping_time(product, owner)?;
        self.parse_ping_response(product, response, owner)
    }

    /// Forms, throttles, sends and applies a financial ping.
    ///
    /// The last ping time is updated before sending, so a failed send does
    /// not cause an immediate retry.
    pub fn send_financial_ping(
        &self,
        product: Product,
        request: &PingRequest,
        owner: &OwnerId,
        transport: &dyn Transport,
        skip_throttle: bool,
    ) -> Result<PingOutcome> {
        let mut request_path = CappedString::with_capacity(MAX_PING_REQUEST_LENGTH + 1);
        self.form_ping_request(product, request, owner, &mut request_path)?;

        if !self.is_ping_time(product, owner, skip_throttle)? {
            tracing::debug!("Not yet time to ping for {}", product);
            return Err(RlzError::NotPingTime);
        }
        self.update_last_ping_time(product, owner)?;

        let response = transport.send(request_path.as_str())?;
        self.parse_ping_response(product, &response, owner)
    }

    // ============================================================
    // LIFECYCLE
    // ============================================================

    /// Removes everything stored for `product` and the RLZs of `points`,
    /// then deletes namespaces left empty.
    pub fn clear_product_state(
        &self,
        product: Product,
        points: &[AccessPoint],
        owner: &OwnerId,
    ) -> Result<()> {
        let guard = self.lock_for(owner, true)?;
        let store = self.store.as_ref();

        EventStore::new(store, owner, &guard).clear_all(product)?;
        self.scheduler(owner, &guard).clear_last_ping_time(product)?;

        let rlz = RlzStore::new(store, owner, &guard);
        for &point in points {
            if !point.is_supported() {
                tracing::debug!("Skipping unsupported access point '{}'", point);
                continue;
            }
            rlz.set(point, "")?;
        }

        for key in [
            rlzs_key(),
            events_root_key(),
            stateful_events_root_key(),
            ping_times_key(),
            lib_key(),
            parent_key(),
        ] {
            store.delete_key_if_empty(owner, &key)?;
        }
        tracing::info!("Cleared state of {} for {}", product, owner);
        Ok(())
    }

    /// Opens the shared state to every local account. Does not take the lock.
    pub fn ensure_broad_access(&self) -> Result<bool> {
        self.gate.ensure_broad_access()
    }

    // ============================================================
    // HELPERS
    // ============================================================

    fn scheduler<'a>(&'a self, owner: &'a OwnerId, guard: &ExclusiveLock<'_>) -> PingScheduler<'a> {
        PingScheduler::new(self.store.as_ref(), owner, self.clock.as_ref(), guard)
    }

    fn collect_ping_params(
        &self,
        guard: &ExclusiveLock<'_>,
        points: &[AccessPoint],
        owner: &OwnerId,
    ) -> Result<String> {
        let rlz = RlzStore::new(self.store.as_ref(), owner, guard);
        let mut rlzs = Vec::new();
        for &point in points {
            if let Some(value) = rlz.get(point)? {
                rlzs.push((point, value));
            }
        }

        let dcc = if guard.has_access(&OwnerId::machine(), false) {
            DealCodeStore::new(self.store.as_ref(), guard).get()?
        } else {
            None
        };
        Ok(ping_params(&rlzs, dcc.as_deref()))
    }

    /// Machine id for a request; `None` when it cannot be read or created.
    fn machine_id_locked(&self, guard: &ExclusiveLock<'_>) -> Option<String> {
        let machine = OwnerId::machine();
        if !guard.has_access(&machine, true) {
            return None;
        }
        match DealCodeStore::new(self.store.as_ref(), guard).machine_id() {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!("Machine id unavailable: {}", err);
                None
            }
        }
    }
}

fn apply_deal_code(deal: &DealCodeStore<'_>, response: &str) -> Result<bool> {
    let stored = deal.get()?;
    match new_code_from_ping_response(response, stored.as_deref())? {
        Some(new_code) => {
            deal.set(&new_code)?;
            tracing::info!("Machine deal code updated from ping response");
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::gate::Permission;
    use crate::ping::checksum::crc32;
    use crate::ping::scheduler::ManualClock;
    use std::sync::Mutex;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    fn with_checksum(body: &str) -> String {
        format!("{}crc32: {:08X}", body, crc32(body.as_bytes()))
    }

    fn alice() -> OwnerId {
        OwnerId::user("alice")
    }

    struct Fixture {
        client: RlzClient,
        store: Arc<MemoryStore>,
        gate: Arc<ProcessGate>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(ProcessGate::default());
        let clock = Arc::new(ManualClock::new(1000 * DAY_MS));
        let client = RlzClient::new(store.clone(), gate.clone()).with_clock(clock.clone());
        Fixture {
            client,
            store,
            gate,
            clock,
        }
    }

    /// Answers every request with a canned response and remembers the requests.
    struct CannedTransport {
        response: String,
        requests: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        fn new(response: String) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for CannedTransport {
        fn send(&self, request: &str) -> Result<String> {
            self.requests.lock().unwrap().push(request.to_string());
            Ok(self.response.clone())
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(&self, _request: &str) -> Result<String> {
            Err(RlzError::Transport("connection refused".to_string()))
        }
    }

    // ============================================================
    // RESPONSE PARSING
    // ============================================================

    #[test]
    fn test_parse_sets_rlz() {
        let f = fixture();
        let owner = alice();

        let outcome = f
            .client
            .parse_ping_response(Product::IeToolbar, "rlzI7: 1R3_en\ncrc32: 8AC7EE6A", &owner)
            .unwrap();

        assert!(matches!(outcome, PingOutcome::Applied(_)));
        assert_eq!(
            f.client
                .access_point_rlz(AccessPoint::IeDefaultSearch, &owner)
                .unwrap()
                .as_deref(),
            Some("1R3_en")
        );
    }

    #[test]
    fn test_parse_applies_every_line_kind() {
        let f = fixture();
        let owner = alice();
        let product = Product::IeToolbar;

        f.client
            .record_product_event(product, AccessPoint::IeDefaultSearch, Event::Install, &owner)
            .unwrap();
        f.client
            .record_product_event(product, AccessPoint::IetbSearchBox, Event::FirstSearch, &owner)
            .unwrap();

        let response = with_checksum(
            "rlzI7: new_i7\nrlzH1: mobile\nrlzT4: a/b\nevents: I7I,ZZZ\nstateful_events: T4F\njunk line\nrlzQQ: x\n",
        );
        let outcome = f.client.parse_ping_response(product, &response, &owner).unwrap();

        let PingOutcome::Applied(changes) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(changes.rlzs_set, 2);
        assert_eq!(changes.rlzs_unsupported, 1);
        assert_eq!(changes.events_cleared, 1);
        assert_eq!(changes.stateful_events_recorded, 1);
        assert_eq!(changes.skipped_lines, 1);
        assert_eq!(changes.failures, 0);

        assert_eq!(
            f.client
                .access_point_rlz(AccessPoint::IetbSearchBox, &owner)
                .unwrap()
                .as_deref(),
            Some("a.b")
        );

        // Both events are gone: one acknowledged, one turned stateful.
        let mut out = CappedString::with_capacity(64);
        assert!(matches!(
            f.client.product_events_as_cgi(product, &owner, &mut out),
            Err(RlzError::NotFound)
        ));

        // A stateful event is never recorded as transient again.
        f.client
            .record_product_event(product, AccessPoint::IetbSearchBox, Event::FirstSearch, &owner)
            .unwrap();
        assert!(matches!(
            f.client.product_events_as_cgi(product, &owner, &mut out),
            Err(RlzError::NotFound)
        ));
    }

    #[test]
    fn test_rejected_response_changes_nothing() {
        let f = fixture();
        let owner = alice();
        f.client
            .set_access_point_rlz(AccessPoint::IeDefaultSearch, "old", &owner)
            .unwrap();

        let result = f
            .client
            .parse_ping_response(Product::IeToolbar, "rlzI7: new\ncrc32: 0", &owner);

        assert!(matches!(result, Err(RlzError::ChecksumMismatch)));
        assert_eq!(
            f.client
                .access_point_rlz(AccessPoint::IeDefaultSearch, &owner)
                .unwrap()
                .as_deref(),
            Some("old")
        );
    }

    #[test]
    fn test_empty_response_is_accepted() {
        let f = fixture();
        let outcome = f
            .client
            .parse_ping_response(Product::Chrome, "crc32: 0x0", &alice())
            .unwrap();
        assert_eq!(outcome, PingOutcome::EmptyAccepted);
    }

    #[test]
    fn test_parse_requires_write_access() {
        let f = fixture();
        f.gate.restrict(alice(), Permission::ReadOnly);

        let result = f
            .client
            .parse_ping_response(Product::Chrome, "rlzI7: 1R3_en\ncrc32: 8AC7EE6A", &alice());
        assert!(matches!(result, Err(RlzError::AccessDenied { write: true, .. })));
        assert!(!f.gate.is_held());
    }

    #[test]
    fn test_parse_updates_deal_code() {
        let f = fixture();
        let owner = alice();

        let response = with_checksum("rlzI7: x\ndcc: \nset_dcc: DEAL1\n");
        let PingOutcome::Applied(changes) = f
            .client
            .parse_ping_response(Product::Chrome, &response, &owner)
            .unwrap()
        else {
            panic!("expected applied outcome");
        };

        assert!(changes.deal_code_updated);
        assert_eq!(f.client.machine_deal_code().unwrap().as_deref(), Some("DEAL1"));
    }

    #[test]
    fn test_parse_without_machine_access_leaves_deal_code() {
        let f = fixture();
        f.gate.restrict(OwnerId::machine(), Permission::ReadOnly);

        let response = with_checksum("dcc: \nset_dcc: DEAL1\n");
        f.client
            .parse_ping_response(Product::Chrome, &response, &alice())
            .unwrap();

        assert_eq!(f.client.machine_deal_code().unwrap(), None);
    }

    #[test]
    fn test_deal_code_from_ping_response() {
        let f = fixture();
        f.client.set_machine_deal_code("OLD").unwrap();

        let wrong_echo = with_checksum("dcc: OTHER\nset_dcc: NEW\n");
        assert!(!f.client.set_machine_deal_code_from_ping_response(&wrong_echo).unwrap());
        assert_eq!(f.client.machine_deal_code().unwrap().as_deref(), Some("OLD"));

        let good = with_checksum("dcc: OLD\nset_dcc: NEW\n");
        assert_eq!(
            f.client.new_deal_code_from_ping_response(&good).unwrap().as_deref(),
            Some("NEW")
        );
        assert!(f.client.set_machine_deal_code_from_ping_response(&good).unwrap());

        let mut out = CappedString::with_capacity(16);
        f.client.machine_deal_code_as_cgi(&mut out).unwrap();
        assert_eq!(out.as_str(), "dcc=NEW");
    }

    // ============================================================
    // REQUESTS
    // ============================================================

    #[test]
    fn test_ping_params() {
        let f = fixture();
        let owner = alice();
        f.client
            .set_access_point_rlz(AccessPoint::IetbSearchBox, "T4rlz", &owner)
            .unwrap();
        f.client
            .set_access_point_rlz(AccessPoint::IeDefaultSearch, "I7rlz", &owner)
            .unwrap();

        let points = [
            AccessPoint::IetbSearchBox,
            AccessPoint::IeHomePage,
            AccessPoint::IeDefaultSearch,
        ];
        let mut out = CappedString::with_capacity(2048);
        f.client.ping_params(&points, &owner, &mut out).unwrap();
        assert_eq!(out.as_str(), "rep=2&rlz=T4:T4rlz,I7:I7rlz");

        f.client.set_machine_deal_code("dcc_value").unwrap();
        f.client.ping_params(&points, &owner, &mut out).unwrap();
        assert_eq!(out.as_str(), "rep=2&rlz=T4:T4rlz,I7:I7rlz&dcc=dcc_value");

        let mut small = CappedString::with_capacity(10);
        assert!(matches!(
            f.client.ping_params(&points, &owner, &mut small),
            Err(RlzError::BufferTooSmall { .. })
        ));
        assert!(small.is_empty());
    }

    #[test]
    fn test_form_request_with_events() {
        let f = fixture();
        let owner = alice();
        f.client
            .set_access_point_rlz(AccessPoint::ChromeOmnibox, "c1", &owner)
            .unwrap();
        f.client
            .set_access_point_rlz(AccessPoint::IeDefaultSearch, "i7", &owner)
            .unwrap();
        f.client
            .record_product_event(Product::Chrome, AccessPoint::ChromeOmnibox, Event::Install, &owner)
            .unwrap();

        let request = PingRequest::new("chrome", vec![AccessPoint::ChromeOmnibox])
            .with_brand("GGLA")
            .excluding_machine_id();
        let mut out = CappedString::with_capacity(MAX_PING_REQUEST_LENGTH + 1);
        f.client
            .form_ping_request(Product::Chrome, &request, &owner, &mut out)
            .unwrap();

        assert_eq!(
            out.as_str(),
            "/tools/pso/ping?as=chrome&brand=GGLA&events=C1I&rep=2&rlz=C1:c1"
        );
    }

    #[test]
    fn test_form_request_without_events_reports_all_points() {
        let f = fixture();
        let owner = alice();
        f.client
            .set_access_point_rlz(AccessPoint::ChromeOmnibox, "c1", &owner)
            .unwrap();
        f.client
            .set_access_point_rlz(AccessPoint::IeDefaultSearch, "i7", &owner)
            .unwrap();

        let request = PingRequest::new("chrome", vec![AccessPoint::ChromeOmnibox]);
        let mut out = CappedString::with_capacity(MAX_PING_REQUEST_LENGTH + 1);
        f.client
            .form_ping_request(Product::Chrome, &request, &owner, &mut out)
            .unwrap();

        let machine_id = f.client.machine_id().unwrap();
        assert_eq!(
            out.as_str(),
            format!(
                "/tools/pso/ping?as=chrome&id={}&rep=2&rlz=I7:i7,C1:c1",
                machine_id
            )
        );
    }

    // ============================================================
    // SCHEDULING AND SENDING
    // ============================================================

    #[test]
    fn test_form_request_rejects_oversized_params() {
        let f = fixture();
        let owner = alice();
        let long_rlz = "a".repeat(64);
        let points: Vec<AccessPoint> = AccessPoint::supported().take(31).collect();
        assert_eq!(points.len(), 31);
        for &point in &points {
            f.client.set_access_point_rlz(point, &long_rlz, &owner).unwrap();
        }

        let mut params = CappedString::with_capacity(MAX_CGI_LENGTH + 1);
        assert!(matches!(
            f.client.ping_params(&points, &owner, &mut params),
            Err(RlzError::BufferTooSmall { .. })
        ));

        // No pending events, so every supported point is reported.
        let request = PingRequest::new("chrome", vec![]).excluding_machine_id();
        let mut out = CappedString::with_capacity(MAX_PING_REQUEST_LENGTH + 1);
        out.fill("stale").unwrap();
        assert!(matches!(
            f.client.form_ping_request(Product::Chrome, &request, &owner, &mut out),
            Err(RlzError::BufferTooSmall { .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_form_request_respects_output_capacity() {
        let f = fixture();
        let owner = alice();
        f.client
            .set_access_point_rlz(AccessPoint::ChromeOmnibox, "c1", &owner)
            .unwrap();

        let request = PingRequest::new("chrome", vec![]).excluding_machine_id();
        let expected = "/tools/pso/ping?as=chrome&rep=2&rlz=C1:c1";

        let mut exact = CappedString::with_capacity(expected.len() + 1);
        f.client
            .form_ping_request(Product::Chrome, &request, &owner, &mut exact)
            .unwrap();
        assert_eq!(exact.as_str(), expected);

        let mut short = CappedString::with_capacity(expected.len());
        assert!(matches!(
            f.client.form_ping_request(Product::Chrome, &request, &owner, &mut short),
            Err(RlzError::BufferTooSmall { .. })
        ));
        assert!(short.is_empty());
    }

    #[test]
    fn test_send_financial_ping() {
        let f = fixture();
        let owner = alice();
        f.client
            .record_product_event(Product::Chrome, AccessPoint::ChromeOmnibox, Event::Install, &owner)
            .unwrap();

        let transport = CannedTransport::new(with_checksum("rlzC1: fresh\nevents: C1I\n"));
        let request = PingRequest::new("chrome", vec![AccessPoint::ChromeOmnibox]);

        let outcome = f
            .client
            .send_financial_ping(Product::Chrome, &request, &owner, &transport, false)
            .unwrap();
        assert!(matches!(outcome, PingOutcome::Applied(_)));

        let requests = transport.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("events=C1I"));

        assert_eq!(
            f.client
                .access_point_rlz(AccessPoint::ChromeOmnibox, &owner)
                .unwrap()
                .as_deref(),
            Some("fresh")
        );

        // Throttled until a week has passed (no events left).
        assert!(matches!(
            f.client
                .send_financial_ping(Product::Chrome, &request, &owner, &transport, false),
            Err(RlzError::NotPingTime)
        ));
        f.client
            .send_financial_ping(Product::Chrome, &request, &owner, &transport, true)
            .unwrap();

        f.clock.advance(7 * DAY_MS);
        assert!(f.client.is_ping_time(Product::Chrome, &owner, false).unwrap());
    }

    #[test]
    fn test_failed_send_still_updates_ping_time() {
        let f = fixture();
        let owner = alice();
        let request = PingRequest::new("chrome", vec![]);

        let result = f.client.send_financial_ping(
            Product::Chrome,
            &request,
            &owner,
            &FailingTransport,
            false,
        );

        assert!(matches!(result, Err(RlzError::Transport(_))));
        assert!(!f.client.is_ping_time(Product::Chrome, &owner, false).unwrap());
    }

    #[test]
    fn test_parse_financial_ping_response_updates_time_first() {
        let f = fixture();
        let owner = alice();

        let result = f
            .client
            .parse_financial_ping_response(Product::Desktop, "garbage", &owner);

        assert!(result.is_err());
        assert!(!f.client.is_ping_time(Product::Desktop, &owner, false).unwrap());
    }

    // ============================================================
    // LIFECYCLE
    // ============================================================

    #[test]
    fn test_clear_product_state() {
        let f = fixture();
        let owner = alice();
        let product = Product::Desktop;

        f.client
            .set_access_point_rlz(AccessPoint::GdDeskband, "deskband", &owner)
            .unwrap();
        f.client
            .record_product_event(product, AccessPoint::GdDeskband, Event::Install, &owner)
            .unwrap();
        f.client
            .record_stateful_event(product, AccessPoint::GdDeskband, Event::FirstSearch, &owner)
            .unwrap();
        f.client.update_last_ping_time(product, &owner).unwrap();

        f.client
            .clear_product_state(product, &[AccessPoint::GdDeskband], &owner)
            .unwrap();

        assert_eq!(
            f.client
                .access_point_rlz(AccessPoint::GdDeskband, &owner)
                .unwrap(),
            None
        );
        assert!(f.client.is_ping_time(product, &owner, false).unwrap());
        // Every namespace was empty and has been removed.
        assert_eq!(f.store.key_count(&owner), 0);
    }

    #[test]
    fn test_clear_product_state_keeps_other_products() {
        let f = fixture();
        let owner = alice();

        f.client
            .set_access_point_rlz(AccessPoint::GdDeskband, "deskband", &owner)
            .unwrap();
        f.client
            .set_access_point_rlz(AccessPoint::ChromeOmnibox, "chrome", &owner)
            .unwrap();
        f.client
            .record_product_event(Product::Chrome, AccessPoint::ChromeOmnibox, Event::Install, &owner)
            .unwrap();

        f.client
            .clear_product_state(Product::Desktop, &[AccessPoint::GdDeskband], &owner)
            .unwrap();

        assert_eq!(
            f.client
                .access_point_rlz(AccessPoint::ChromeOmnibox, &owner)
                .unwrap()
                .as_deref(),
            Some("chrome")
        );
        let mut out = CappedString::with_capacity(64);
        f.client
            .product_events_as_cgi(Product::Chrome, &owner, &mut out)
            .unwrap();
        assert_eq!(out.as_str(), "events=C1I");
    }

    #[test]
    fn test_clear_all_and_single_events() {
        let f = fixture();
        let owner = alice();
        f.client
            .record_product_event(Product::Pack, AccessPoint::IeHomePage, Event::Install, &owner)
            .unwrap();
        f.client
            .record_product_event(Product::Pack, AccessPoint::IeHomePage, Event::Activate, &owner)
            .unwrap();

        f.client
            .clear_product_event(Product::Pack, AccessPoint::IeHomePage, Event::Install, &owner)
            .unwrap();
        let mut out = CappedString::with_capacity(64);
        f.client
            .product_events_as_cgi(Product::Pack, &owner, &mut out)
            .unwrap();
        assert_eq!(out.as_str(), "events=W1A");

        f.client.clear_all_product_events(Product::Pack, &owner).unwrap();
        assert!(matches!(
            f.client.product_events_as_cgi(Product::Pack, &owner, &mut out),
            Err(RlzError::NotFound)
        ));
    }

    #[test]
    fn test_denied_owner_cannot_read() {
        let f = fixture();
        f.gate.restrict(alice(), Permission::Denied);

        assert!(matches!(
            f.client.access_point_rlz(AccessPoint::IeDefaultSearch, &alice()),
            Err(RlzError::AccessDenied { write: false, .. })
        ));
        assert!(!f.gate.is_held());
    }

    #[test]
    fn test_lock_timeout_surfaces() {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(ProcessGate::new(std::time::Duration::from_millis(30)));
        let client = RlzClient::new(store, gate.clone());

        gate.acquire_exclusive().unwrap();
        assert!(matches!(
            client.access_point_rlz(AccessPoint::IeDefaultSearch, &alice()),
            Err(RlzError::LockTimeout(_))
        ));
        gate.release_exclusive();

        assert_eq!(
            client
                .access_point_rlz(AccessPoint::IeDefaultSearch, &alice())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_file_backed_client_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            store_dir: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };

        RlzClient::from_config(&config)
            .set_access_point_rlz(AccessPoint::ChromeOmnibox, "persisted", &alice())
            .unwrap();

        let reopened = RlzClient::from_config(&config);
        assert_eq!(
            reopened
                .access_point_rlz(AccessPoint::ChromeOmnibox, &alice())
                .unwrap()
                .as_deref(),
            Some("persisted")
        );
        assert!(reopened.ensure_broad_access().is_ok());
    }
}
