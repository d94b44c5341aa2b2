//! Membership list service, kind 30000 (spec §3 "Membership list", §4.G).

use crate::error::{Error, Result};
use crate::store::AddressableStore;
use nostr_wire::{Coordinate, Event, EventBuilder, Filter, KeyPair, Kind, PublicKey, Tag};
use nostr_relay_net::{PublishReport, RelayPool};
use std::sync::Arc;
use std::time::Duration;

/// A parsed membership-list snapshot. The event is a full roster, not a
/// delta — every member currently on the team appears as a `"p"` tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipList {
    pub captain: PublicKey,
    pub team_d_tag: String,
    pub members: Vec<PublicKey>,
}

impl MembershipList {
    pub fn from_event(event: &Event) -> Result<Self> {
        let d_tag = event
            .d_tag()
            .ok_or_else(|| crate::error::Error::InvalidRange("membership list missing d tag".into()))?;
        let team_d_tag = d_tag
            .strip_suffix("-members")
            .ok_or_else(|| crate::error::Error::InvalidRange("membership list d tag missing -members suffix".into()))?
            .to_string();
        let members = event
            .tag_values("p")
            .into_iter()
            .filter_map(|hex| PublicKey::parse(hex).ok())
            .collect();
        Ok(Self {
            captain: event.pubkey,
            team_d_tag,
            members,
        })
    }

    pub fn contains(&self, pubkey: &PublicKey) -> bool {
        self.members.contains(pubkey)
    }

    fn d_tag(&self) -> String {
        format!("{}-members", self.team_d_tag)
    }
}

/// Query, add, and remove operations against a team's membership list
/// (spec §4.G). Holds a shared [`AddressableStore`] so repeated calls
/// converge on whatever the pool has most recently observed, and a
/// [`RelayPool`] to actively query for a list the store hasn't seen yet.
pub struct MembershipListService {
    pool: Arc<RelayPool>,
    store: Arc<AddressableStore>,
}

impl MembershipListService {
    pub fn new(pool: Arc<RelayPool>, store: Arc<AddressableStore>) -> Self {
        Self { pool, store }
    }

    /// Query kind 30000 with `author=captain`, `#d=<team_d_tag>-members`,
    /// `limit=1`; returns the addressable-latest snapshot the store has
    /// once the subscription converges or the deadline elapses. A missing
    /// list means "no roster yet", not "empty roster" (spec §3).
    pub async fn get_list(&self, captain: PublicKey, team_d_tag: &str, deadline: Duration) -> Result<Option<MembershipList>> {
        let d_tag = format!("{team_d_tag}-members");
        let coord = Coordinate::new(captain, Kind::MEMBERSHIP_LIST, d_tag.clone());

        let filter = Filter::new()
            .kinds([Kind::MEMBERSHIP_LIST])
            .authors([captain])
            .tag("d", [d_tag])
            .limit(1);
        let handle = self.pool.subscribe(vec![filter])?;

        let drain = async {
            while let Some(event) = handle.next_event().await {
                self.store.observe(event);
            }
        };
        tokio::select! {
            _ = drain => {},
            _ = handle.wait_eose(deadline) => {},
        }
        handle.close();

        self.store
            .get(&coord)
            .map(|event| MembershipList::from_event(&event))
            .transpose()
    }

    /// Returns `None` if `new_member` is already on the list. Otherwise an
    /// unsigned replacement event template with the member appended;
    /// caller signs and publishes (spec §4.G).
    pub fn prepare_add(&self, list: &MembershipList, new_member: PublicKey) -> Option<EventBuilder> {
        if list.contains(&new_member) {
            return None;
        }
        let mut members = list.members.clone();
        members.push(new_member);
        Some(template_for(list, &members))
    }

    /// Returns `None` if `member` is not on the list. Mirror of
    /// [`MembershipListService::prepare_add`].
    pub fn prepare_remove(&self, list: &MembershipList, member: &PublicKey) -> Option<EventBuilder> {
        if !list.contains(member) {
            return None;
        }
        let members: Vec<PublicKey> = list.members.iter().filter(|p| *p != member).copied().collect();
        Some(template_for(list, &members))
    }

    pub fn is_member(&self, list: &MembershipList, pubkey: &PublicKey) -> bool {
        list.contains(pubkey)
    }

    /// Re-fetch the latest observed list and compare it against `list`.
    /// `Err(StaleList)` if the caller's copy has fallen behind what the
    /// pool has actually seen (spec §7 "Consistency"); the service must
    /// surface the latest list before every prepare (spec §4.G).
    pub async fn ensure_fresh(&self, list: &MembershipList, deadline: Duration) -> Result<()> {
        let latest = self.get_list(list.captain, &list.team_d_tag, deadline).await?;
        freshness_check(latest.as_ref(), list)
    }

    /// Captain-gated, freshness-checked add: `key` must sign for
    /// `list.captain` (spec §7 "NotCaptain must be caught before a signed
    /// replacement is published"), the caller's `list` must match the
    /// latest observed snapshot, and then the replacement is built, signed,
    /// and published. `Ok(None)` if `new_member` was already present
    /// (idempotent no-op per spec §4.G).
    pub async fn add_member(
        &self,
        list: &MembershipList,
        new_member: PublicKey,
        key: &KeyPair,
        deadline: Duration,
    ) -> Result<Option<PublishReport>> {
        if key.public_key() != list.captain {
            return Err(Error::NotCaptain);
        }
        self.ensure_fresh(list, deadline).await?;
        let Some(builder) = self.prepare_add(list, new_member) else {
            return Ok(None);
        };
        let event = builder.build(key)?;
        self.store.observe(event.clone());
        Ok(Some(self.pool.publish(event).await?))
    }

    /// Mirror of [`MembershipListService::add_member`] for removal.
    pub async fn remove_member(
        &self,
        list: &MembershipList,
        member: &PublicKey,
        key: &KeyPair,
        deadline: Duration,
    ) -> Result<Option<PublishReport>> {
        if key.public_key() != list.captain {
            return Err(Error::NotCaptain);
        }
        self.ensure_fresh(list, deadline).await?;
        let Some(builder) = self.prepare_remove(list, member) else {
            return Ok(None);
        };
        let event = builder.build(key)?;
        self.store.observe(event.clone());
        Ok(Some(self.pool.publish(event).await?))
    }
}

/// `Err(StaleList)` iff `latest` exists and disagrees with `local` (spec §7
/// "Consistency"). A missing `latest` (no roster observed yet) is not
/// staleness — there is nothing to have fallen behind.
fn freshness_check(latest: Option<&MembershipList>, local: &MembershipList) -> Result<()> {
    match latest {
        Some(latest) if latest.members == local.members => Ok(()),
        Some(_) => Err(Error::StaleList),
        None => Ok(()),
    }
}

fn template_for(list: &MembershipList, members: &[PublicKey]) -> EventBuilder {
    let mut builder = EventBuilder::new(Kind::MEMBERSHIP_LIST).tag(Tag::d(list.d_tag()));
    for member in members {
        builder = builder.tag(Tag::p(member));
    }
    builder
}
