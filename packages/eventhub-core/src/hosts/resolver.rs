//! Host → organization resolution and the orphan reconciliation batch.

use std::sync::Arc;

use serde::Serialize;

use super::scoring::{NameScorer, OverlapScorer, MATCH_THRESHOLD};
use crate::error::{Error, Result};
use crate::storage::{attach_orphan_event_tx, mark_host_primary_tx, Database};

/// Events examined per reconciliation run when no limit is given.
pub const DEFAULT_RECONCILE_LIMIT: usize = 500;

/// Outcome of resolving one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Resolution {
    #[serde(rename_all = "camelCase")]
    Matched {
        organization_id: String,
        host_id: String,
        score: u8,
    },
    Unmatched,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }
}

/// Totals of one reconciliation run. Per-event failures are collected, not
/// raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub matched: usize,
    pub errors: Vec<String>,
}

/// Resolves event hosts to verified organizations.
#[derive(Clone)]
pub struct HostResolver {
    db: Database,
    scorer: Arc<dyn NameScorer>,
}

impl HostResolver {
    /// Resolver using [`OverlapScorer`].
    pub fn new(db: Database) -> Self {
        Self::with_scorer(db, Arc::new(OverlapScorer))
    }

    /// Resolver with a custom scoring strategy.
    pub fn with_scorer(db: Database, scorer: Arc<dyn NameScorer>) -> Self {
        Self { db, scorer }
    }

    /// Score every host of the event against every verified organization
    /// and apply the best match.
    ///
    /// Ties keep the earlier host, then the older organization. A match sets
    /// the event's organization only while it is still orphaned.
    pub fn resolve_event(&self, event_id: &str) -> Result<Resolution> {
        let event = self.db.get_event(event_id)?.ok_or(Error::NotFound("Event"))?;
        let hosts = self.db.list_event_hosts(event_id)?;
        if hosts.is_empty() {
            return Ok(Resolution::Unmatched);
        }
        let organizations = self.db.list_verified_organizations()?;

        let mut best: Option<(usize, usize, u8)> = None;
        for (hi, host) in hosts.iter().enumerate() {
            for (oi, org) in organizations.iter().enumerate() {
                let score = self.scorer.score(&host.name, &org.name);
                if score >= MATCH_THRESHOLD && best.map_or(true, |(_, _, b)| score > b) {
                    best = Some((hi, oi, score));
                }
            }
        }

        let (hi, oi, score) = match best {
            Some(b) => b,
            None => {
                tracing::debug!(event_id = %event_id, hosts = hosts.len(), "No host matched a verified organization");
                return Ok(Resolution::Unmatched);
            }
        };
        let host = &hosts[hi];
        let org = &organizations[oi];

        let now = crate::time::now_timestamp();
        let attached = self.db.transaction(|tx| {
            mark_host_primary_tx(tx, &host.id, &org.id, score)?;
            attach_orphan_event_tx(tx, event_id, &org.id, now)
        })?;

        tracing::info!(
            event_id = %event_id,
            host = %host.name,
            organization = %org.slug,
            score,
            attached,
            was_orphan = event.organization_id.is_none(),
            "Host resolved"
        );
        Ok(Resolution::Matched {
            organization_id: org.id.clone(),
            host_id: host.id.clone(),
            score,
        })
    }

    /// Retry resolution for up to `limit` orphaned imported events, oldest
    /// first. Never aborts on a single event.
    pub fn reconcile_orphans(&self, limit: usize) -> Result<ReconcileSummary> {
        let events = self.db.list_orphan_imported_events(limit)?;
        let mut summary = ReconcileSummary {
            scanned: events.len(),
            ..Default::default()
        };

        for event in events {
            match self.resolve_event(&event.id) {
                Ok(r) if r.is_matched() => summary.matched += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(event_id = %event.id, error = %e, "Reconciliation failed for event");
                    summary.errors.push(format!("{}: {}", event.id, e));
                }
            }
        }

        tracing::info!(
            scanned = summary.scanned,
            matched = summary.matched,
            errors = summary.errors.len(),
            "Orphan reconciliation finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::{CommunityService, NewOrganization, Permissions};
    use crate::events::{ApprovalState, EventFormat, EventSource, EventType};
    use crate::identity::{CurrentUser, GodMode};
    use crate::ids::generate_id;
    use crate::storage::{EventRecord, NewHost, OrganizationRecord};

    struct Fixture {
        db: Database,
        communities: CommunityService,
        resolver: HostResolver,
    }

    fn fixture() -> Fixture {
        let db = Database::open(None).unwrap();
        let perms = Permissions::new(db.clone(), GodMode::from_list("root@example.com"));
        Fixture {
            communities: CommunityService::new(db.clone(), perms),
            resolver: HostResolver::new(db.clone()),
            db,
        }
    }

    fn verified_org(f: &Fixture, name: &str) -> OrganizationRecord {
        let owner = CurrentUser::verified("owner", "owner@example.com");
        let root = CurrentUser::verified("root", "root@example.com");
        let org = f
            .communities
            .create_organization(&owner, NewOrganization::named(name))
            .unwrap();
        f.communities.set_verified(&root, &org.id, true).unwrap()
    }

    fn imported(f: &Fixture, hosts: &[&str]) -> String {
        let id = generate_id();
        f.db.insert_event(&EventRecord {
            slug: id.clone(),
            short_code: id[..7].to_string(),
            id: id.clone(),
            organization_id: None,
            title: "Imported".into(),
            description: None,
            event_type: EventType::Meetup,
            format: EventFormat::InPerson,
            city: None,
            venue: None,
            url: None,
            cover_url: None,
            starts_at: 0,
            ends_at: 0,
            registration_opens_at: None,
            registration_closes_at: None,
            approval: ApprovalState::Pending,
            source: EventSource::Luma,
            external_id: Some(format!("evt-{}", id)),
            submitted_by: None,
            created_at: 0,
            updated_at: 0,
        })
        .unwrap();
        let hosts: Vec<NewHost> = hosts
            .iter()
            .map(|n| NewHost {
                name: n.to_string(),
                email: None,
                avatar_url: None,
            })
            .collect();
        f.db.sync_event_hosts(&id, &hosts, 0).unwrap();
        id
    }

    #[test]
    fn test_resolves_best_host() {
        let f = fixture();
        let org = verified_org(&f, "GDG Lima");
        let event_id = imported(&f, &["Maria Lopez", "GDG Lima"]);

        let resolution = f.resolver.resolve_event(&event_id).unwrap();
        match resolution {
            Resolution::Matched { organization_id, score, .. } => {
                assert_eq!(organization_id, org.id);
                assert_eq!(score, 100);
            }
            Resolution::Unmatched => panic!("expected a match"),
        }

        let event = f.db.get_event(&event_id).unwrap().unwrap();
        assert_eq!(event.organization_id.as_deref(), Some(org.id.as_str()));
        let hosts = f.db.list_event_hosts(&event_id).unwrap();
        let primary: Vec<_> = hosts.iter().filter(|h| h.is_primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].name, "GDG Lima");
        assert_eq!(primary[0].match_score, Some(100));
    }

    #[test]
    fn test_unverified_orgs_are_ignored() {
        let f = fixture();
        let owner = CurrentUser::verified("owner", "owner@example.com");
        f.communities
            .create_organization(&owner, NewOrganization::named("Rust Lima"))
            .unwrap();
        let event_id = imported(&f, &["Rust Lima"]);

        assert_eq!(f.resolver.resolve_event(&event_id).unwrap(), Resolution::Unmatched);
        assert!(f.db.get_event(&event_id).unwrap().unwrap().organization_id.is_none());
        // Host row stays for a later claim
        assert_eq!(f.db.list_event_hosts(&event_id).unwrap().len(), 1);
    }

    #[test]
    fn test_tie_prefers_older_org() {
        let f = fixture();
        let older = verified_org(&f, "Python Peru");
        let _newer = verified_org(&f, "Python Chile");
        let event_id = imported(&f, &["Python Lima Community"]);

        match f.resolver.resolve_event(&event_id).unwrap() {
            Resolution::Matched { organization_id, score, .. } => {
                assert_eq!(score, 70);
                assert_eq!(organization_id, older.id);
            }
            Resolution::Unmatched => panic!("expected a match"),
        }
    }

    #[test]
    fn test_already_assigned_event_keeps_org() {
        let f = fixture();
        let first = verified_org(&f, "AWS User Group Lima");
        let second = verified_org(&f, "Cloud Lima");
        let event_id = imported(&f, &["Cloud Lima"]);
        f.db.set_event_organization(&event_id, Some(&first.id), 1).unwrap();

        let resolution = f.resolver.resolve_event(&event_id).unwrap();
        assert!(resolution.is_matched());
        let event = f.db.get_event(&event_id).unwrap().unwrap();
        assert_eq!(event.organization_id.as_deref(), Some(first.id.as_str()));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_reconcile_batch() {
        let f = fixture();
        verified_org(&f, "GDG Lima");
        imported(&f, &["GDG Lima"]);
        imported(&f, &["Someone Else"]);
        imported(&f, &[]);

        let summary = f.resolver.reconcile_orphans(DEFAULT_RECONCILE_LIMIT).unwrap();
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.matched, 1);
        assert!(summary.errors.is_empty());

        // Matched events leave the orphan set
        let again = f.resolver.reconcile_orphans(DEFAULT_RECONCILE_LIMIT).unwrap();
        assert_eq!(again.scanned, 2);
        assert_eq!(again.matched, 0);

        let limited = f.resolver.reconcile_orphans(1).unwrap();
        assert_eq!(limited.scanned, 1);
    }

    struct Always(u8);

    impl NameScorer for Always {
        fn score(&self, _: &str, _: &str) -> u8 {
            self.0
        }
    }

    #[test]
    fn test_custom_scorer() {
        let f = fixture();
        verified_org(&f, "Anything");
        let event_id = imported(&f, &["Unrelated"]);

        let strict = HostResolver::with_scorer(f.db.clone(), Arc::new(Always(MATCH_THRESHOLD - 1)));
        assert_eq!(strict.resolve_event(&event_id).unwrap(), Resolution::Unmatched);

        let lenient = HostResolver::with_scorer(f.db.clone(), Arc::new(Always(MATCH_THRESHOLD)));
        assert!(lenient.resolve_event(&event_id).unwrap().is_matched());
    }
}
