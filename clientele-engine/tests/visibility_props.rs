//! Property tests: visibility, activity windows and pagination over seeded
//! ownership layouts.

use clientele_core::{
    ActivityFilter, CrmResult, ListParams, PageRequest, PartyKind, PartyRef, RecordId, Role,
    SortSpec, TenantContext, TenantId,
};
use clientele_test_utils::generators::{
    arb_activity_filter, arb_layouts, arb_party_kind, arb_sort_spec, PartyLayout,
};
use clientele_test_utils::World;
use proptest::prelude::*;
use std::collections::BTreeSet;

const USERS: usize = 3;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn everything() -> ListParams {
    ListParams {
        page: PageRequest::new(Some(1), Some(1_000)),
        ..ListParams::default()
    }
}

struct Seeded {
    users: Vec<TenantContext>,
    admin: TenantContext,
    parties: Vec<(PartyRef, PartyLayout)>,
}

async fn seed(world: &World, kind: PartyKind, layouts: &[PartyLayout]) -> CrmResult<Seeded> {
    let tenant = TenantId::new(1);
    let mut users = Vec::with_capacity(USERS);
    for i in 0..USERS {
        users.push(
            world
                .add_user(tenant, &format!("user{i}@tenant1.example"), &[Role::User])
                .await?,
        );
    }
    let admin = world.add_admin(tenant, "admin@tenant1.example").await?;

    // A record in another tenant that must never leak.
    let outsider = world
        .add_user(TenantId::new(2), "user0@tenant2.example", &[Role::User])
        .await?;
    let foreign = world.party(kind, &outsider).insert().await?;
    world
        .add_interaction(outsider.tenant_id, foreign, world.days_ago(1))
        .await?;

    let mut parties = Vec::with_capacity(layouts.len());
    for layout in layouts {
        let mut builder = world
            .party(kind, &users[layout.creator])
            .created_days_ago(layout.age_days);
        if let Some(assignee) = layout.assignee {
            builder = builder.assigned_to(users[assignee].user_id);
        }
        let party = builder.insert().await?;
        for days in &layout.interactions {
            world.add_interaction(tenant, party, world.days_ago(*days)).await?;
        }
        if layout.deleted {
            world.soft_delete(tenant, party, users[layout.creator].user_id).await?;
        }
        parties.push((party, layout.clone()));
    }
    Ok(Seeded {
        users,
        admin,
        parties,
    })
}

fn matches_activity(layout: &PartyLayout, filter: ActivityFilter) -> bool {
    match filter {
        ActivityFilter::All => true,
        ActivityFilter::Active => layout.interactions.iter().any(|d| *d <= 30),
        ActivityFilter::Inactive => !layout.interactions.iter().any(|d| *d <= 90),
        ActivityFilter::New => layout.age_days <= 7,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// A party is in a user's default list iff it is live and either assigned
    /// to them, or unassigned and created by them.
    #[test]
    fn prop_default_list_matches_ownership_rule(
        kind in arb_party_kind(),
        layouts in arb_layouts(USERS, 12),
    ) {
        let world = World::new();
        let engine = world.engine();
        runtime().block_on(async {
            let seeded = seed(&world, kind, &layouts).await.expect("seed");
            for (index, user) in seeded.users.iter().enumerate() {
                let listing = engine.list_parties(user, kind, &everything()).await.expect("list");
                let listed: BTreeSet<RecordId> =
                    listing.items.iter().map(|item| item.party.id).collect();
                let expected: BTreeSet<RecordId> = seeded
                    .parties
                    .iter()
                    .filter(|(_, l)| {
                        !l.deleted
                            && (l.assignee == Some(index)
                                || (l.assignee.is_none() && l.creator == index))
                    })
                    .map(|(p, _)| p.id)
                    .collect();
                prop_assert_eq!(&listed, &expected);
                prop_assert_eq!(listing.total, expected.len() as u64);
            }
            Ok(())
        })?;
    }

    /// Single fetch: live and created by or assigned to the caller; admins
    /// see every live record of their tenant.
    #[test]
    fn prop_single_fetch_matches_ownership_rule(
        kind in arb_party_kind(),
        layouts in arb_layouts(USERS, 8),
    ) {
        let world = World::new();
        let engine = world.engine();
        runtime().block_on(async {
            let seeded = seed(&world, kind, &layouts).await.expect("seed");
            for (party, layout) in &seeded.parties {
                for (index, user) in seeded.users.iter().enumerate() {
                    let visible = !layout.deleted
                        && (layout.creator == index || layout.assignee == Some(index));
                    let fetched = engine.get_party(user, kind, party.id).await;
                    prop_assert_eq!(fetched.is_ok(), visible);
                }
                let by_admin = engine.get_party(&seeded.admin, kind, party.id).await;
                prop_assert_eq!(by_admin.is_ok(), !layout.deleted);
            }
            Ok(())
        })?;
    }

    /// Admin list under an activity filter returns exactly the live records
    /// whose history satisfies the window.
    #[test]
    fn prop_activity_filter_windows(
        kind in arb_party_kind(),
        filter in arb_activity_filter(),
        layouts in arb_layouts(USERS, 12),
    ) {
        let world = World::new();
        let engine = world.engine();
        runtime().block_on(async {
            let seeded = seed(&world, kind, &layouts).await.expect("seed");
            let params = ListParams { activity: filter, ..everything() };
            let listing = engine
                .list_all_parties(&seeded.admin, kind, &params, None)
                .await
                .expect("list all");
            let listed: BTreeSet<RecordId> =
                listing.items.iter().map(|item| item.party.id).collect();
            let expected: BTreeSet<RecordId> = seeded
                .parties
                .iter()
                .filter(|(_, l)| !l.deleted && matches_activity(l, filter))
                .map(|(p, _)| p.id)
                .collect();
            prop_assert_eq!(listed, expected);
            Ok(())
        })?;
    }

    /// Walking every page reproduces the unpaginated order, each page holds
    /// at most `per_page` rows, and `total` never changes.
    #[test]
    fn prop_pages_partition_the_full_list(
        kind in arb_party_kind(),
        sort in arb_sort_spec(),
        per_page in 1i64..5,
        layouts in arb_layouts(USERS, 12),
    ) {
        let world = World::new();
        let engine = world.engine();
        runtime().block_on(async {
            let seeded = seed(&world, kind, &layouts).await.expect("seed");
            let full = engine
                .list_all_parties(&seeded.admin, kind, &ListParams { sort, ..everything() }, None)
                .await
                .expect("full list");
            let full_ids: Vec<RecordId> = full.items.iter().map(|i| i.party.id).collect();

            let mut walked = Vec::new();
            let mut page = 1i64;
            loop {
                let params = ListParams {
                    page: PageRequest::new(Some(page), Some(per_page)),
                    sort,
                    activity: ActivityFilter::All,
                };
                let listing = engine
                    .list_all_parties(&seeded.admin, kind, &params, None)
                    .await
                    .expect("page");
                prop_assert_eq!(listing.total, full.total);
                prop_assert!(listing.items.len() as i64 <= per_page);
                if listing.items.is_empty() {
                    break;
                }
                walked.extend(listing.items.iter().map(|i| i.party.id));
                page += 1;
            }
            prop_assert_eq!(walked, full_ids);
            Ok(())
        })?;
    }
}

#[test]
fn test_unknown_keywords_behave_as_defaults() {
    let params = ListParams::from_raw(Some("0"), Some("-3"), Some("shuffle"), Some("dormant"));
    assert_eq!(params.page, PageRequest::new(Some(1), Some(20)));
    assert_eq!(params.sort, SortSpec::Newest);
    assert_eq!(params.activity, ActivityFilter::All);
}
