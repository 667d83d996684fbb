//! Project and contact workflows against the in-memory store.

use clientele_core::{
    ActivityFilter, ContactPatch, CrmError, CrmResult, ListParams, NewContact, NewProject,
    PartyKind, PartyRef, ProjectPatch, ProjectStatus, RecordId, Role, SortSpec, TenantId,
    ValidationError,
};
use clientele_test_utils::assertions::{assert_forbidden, assert_not_found, assert_validation};
use clientele_test_utils::World;

const T1: TenantId = TenantId::new(1);
const T2: TenantId = TenantId::new(2);

// ============================================================================
// PROJECTS
// ============================================================================

#[tokio::test]
async fn test_create_project_defaults_and_dates() -> CrmResult<()> {
    let world = World::new();
    let engine = world.engine();
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let client = world.party(PartyKind::Client, &a).insert().await?;

    let project = engine
        .create_project(
            &a,
            NewProject {
                project_name: Some("Pipe rack".to_string()),
                project_start: Some("2024-07-01".to_string()),
                project_end: Some("sometime".to_string()),
                client_id: Some(client.id),
                ..NewProject::default()
            },
        )
        .await?;
    assert_eq!(project.project_status, ProjectStatus::Pending);
    assert_eq!(project.project_type, "None");
    assert_eq!(project.client_id(), Some(client.id));
    assert_eq!(
        project.project_start.map(|ts| ts.to_rfc3339()),
        Some("2024-07-01T00:00:00+00:00".to_string())
    );
    assert_eq!(project.project_end, None);

    assert_validation(&engine.create_project(&a, NewProject::default()).await);
    Ok(())
}

#[tokio::test]
async fn test_project_link_rules() -> CrmResult<()> {
    let world = World::new();
    let engine = world.engine();
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let outsider = world.add_user(T2, "x@t2.example", &[Role::User]).await?;
    let client = world.party(PartyKind::Client, &a).insert().await?;
    let lead = world.party(PartyKind::Lead, &a).insert().await?;
    let foreign = world.party(PartyKind::Client, &outsider).insert().await?;
    let gone = world.party(PartyKind::Lead, &a).insert().await?;
    world.soft_delete(T1, gone, a.user_id).await?;

    let named = |client_id, lead_id| NewProject {
        project_name: Some("Link test".to_string()),
        client_id,
        lead_id,
        ..NewProject::default()
    };

    let both = engine
        .create_project(&a, named(Some(client.id), Some(lead.id)))
        .await;
    assert!(matches!(
        both,
        Err(CrmError::Validation(ValidationError::InvalidValue { .. }))
    ));
    assert_not_found(&engine.create_project(&a, named(Some(foreign.id), None)).await);
    assert_not_found(&engine.create_project(&a, named(None, Some(gone.id))).await);

    let unlinked = engine.create_project(&a, named(None, None)).await?;
    assert_eq!(unlinked.link, None);

    let relinked = engine
        .update_project(
            &a,
            unlinked.id,
            ProjectPatch {
                lead_id: Some(Some(lead.id)),
                ..ProjectPatch::default()
            },
        )
        .await?;
    assert_eq!(relinked.link, Some(PartyRef::lead(lead.id)));
    Ok(())
}

#[tokio::test]
async fn test_project_lists_and_names() -> CrmResult<()> {
    let world = World::new();
    let engine = world.engine();
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let b = world.add_user(T1, "b@t1.example", &[Role::User]).await?;
    let admin = world.add_admin(T1, "admin@t1.example").await?;
    let client = world
        .party(PartyKind::Client, &a)
        .named("Acme")
        .assigned_to(b.user_id)
        .insert()
        .await?;
    let lead = world.party(PartyKind::Lead, &a).named("Harbor").insert().await?;
    let dropped = world.party(PartyKind::Lead, &a).named("Dropped").insert().await?;

    let old = world.add_project(&a, "Old", Some(client), 30).await?;
    let fresh = world.add_project(&a, "Fresh", Some(lead), 1).await?;
    let orphaned = world.add_project(&a, "Orphaned", Some(dropped), 2).await?;
    world.soft_delete(T1, dropped, a.user_id).await?;
    world.add_project(&b, "Not mine", None, 1).await?;

    let mine = engine.list_projects(&a, &ListParams::default()).await?;
    let ids: Vec<RecordId> = mine.items.iter().map(|p| p.project.id).collect();
    assert_eq!(ids, vec![fresh, orphaned, old]);
    assert_eq!(mine.items[0].lead_name.as_deref(), Some("Harbor"));
    assert_eq!(mine.items[1].lead_name, None);
    assert_eq!(mine.items[1].lead_id, Some(dropped.id));
    assert_eq!(mine.items[2].client_name.as_deref(), Some("Acme"));
    assert!(mine.items.iter().all(|p| p.assigned_to_email.is_none()));

    // Projects have no interactions: active acts as all, activity sort as newest.
    let odd = ListParams {
        sort: SortSpec::Activity,
        activity: ActivityFilter::Active,
        ..ListParams::default()
    };
    let same: Vec<RecordId> = engine
        .list_projects(&a, &odd)
        .await?
        .items
        .iter()
        .map(|p| p.project.id)
        .collect();
    assert_eq!(same, ids);

    let new_only = ListParams {
        activity: ActivityFilter::New,
        ..ListParams::default()
    };
    assert_eq!(engine.list_projects(&a, &new_only).await?.total, 2);

    assert_forbidden(&engine.list_all_projects(&a, &ListParams::default()).await);
    let all = engine.list_all_projects(&admin, &ListParams::default()).await?;
    assert_eq!(all.total, 4);
    let owner_of = |id: RecordId| {
        all.items
            .iter()
            .find(|p| p.project.id == id)
            .and_then(|p| p.assigned_to_email.clone())
    };
    assert_eq!(owner_of(old).as_deref(), Some("b@t1.example"));
    assert_eq!(owner_of(fresh).as_deref(), Some("a@t1.example"));
    assert_eq!(owner_of(orphaned), None);
    Ok(())
}

#[tokio::test]
async fn test_projects_by_party_distinguishes_forbidden_and_not_found() -> CrmResult<()> {
    let world = World::new();
    let engine = world.engine();
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let b = world.add_user(T1, "b@t1.example", &[Role::User]).await?;
    let admin = world.add_admin(T1, "admin@t1.example").await?;
    let outsider = world.add_user(T2, "x@t2.example", &[Role::User]).await?;
    let client = world.party(PartyKind::Client, &a).insert().await?;
    let foreign = world.party(PartyKind::Client, &outsider).insert().await?;
    let first = world.add_project(&a, "First", Some(client), 10).await?;
    let second = world.add_project(&admin, "Second", Some(client), 2).await?;

    let listed = engine.list_projects_by_party(&a, client).await?;
    let ids: Vec<RecordId> = listed.iter().map(|p| p.project.id).collect();
    assert_eq!(ids, vec![second, first]);

    assert_forbidden(&engine.list_projects_by_party(&b, client).await);
    assert_eq!(engine.list_projects_by_party(&admin, client).await?.len(), 2);
    assert_not_found(&engine.list_projects_by_party(&a, foreign).await);
    assert_not_found(
        &engine
            .list_projects_by_party(&a, PartyRef::client(RecordId::new(9_999)))
            .await,
    );

    world.soft_delete(T1, client, a.user_id).await?;
    assert_not_found(&engine.list_projects_by_party(&a, client).await);
    Ok(())
}

#[tokio::test]
async fn test_project_access_requires_creator_unless_admin() -> CrmResult<()> {
    let world = World::new();
    let engine = world.engine();
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let b = world.add_user(T1, "b@t1.example", &[Role::User]).await?;
    let admin = world.add_admin(T1, "admin@t1.example").await?;
    let project = world.add_project(&a, "Tank farm", None, 1).await?;

    assert_not_found(&engine.get_project(&b, project).await);
    assert_eq!(engine.get_project(&admin, project).await?.project.project_name, "Tank farm");

    let won = ProjectPatch {
        project_status: Some(Some("won".to_string())),
        ..ProjectPatch::default()
    };
    assert_not_found(&engine.update_project(&b, project, won.clone()).await);
    let updated = engine.update_project(&admin, project, won).await?;
    assert_eq!(updated.project_status, ProjectStatus::Won);

    assert_not_found(&engine.delete_project(&b, project).await);
    engine.delete_project(&a, project).await?;
    assert_not_found(&engine.get_project(&a, project).await);
    Ok(())
}

// ============================================================================
// CONTACTS
// ============================================================================

#[tokio::test]
async fn test_contact_crud_follows_parent_visibility() -> CrmResult<()> {
    let world = World::new();
    let engine = world.engine();
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let b = world.add_user(T1, "b@t1.example", &[Role::User]).await?;
    let lead = world.party(PartyKind::Lead, &a).insert().await?;

    assert!(engine.list_contacts(&a, None).await?.is_empty());

    let new_contact = NewContact {
        lead_id: Some(lead.id),
        first_name: Some("Dana".to_string()),
        phone: Some("+44 20 7946 0958".to_string()),
        ..NewContact::default()
    };
    assert_not_found(&engine.create_contact(&b, new_contact.clone()).await);
    let created = engine.create_contact(&a, new_contact).await?;
    assert_eq!(created.lead_id, Some(lead.id));
    assert_eq!(created.client_id, None);
    assert_eq!(created.contact.phone.as_deref(), Some("+442079460958"));

    assert_not_found(&engine.list_contacts(&b, Some(lead)).await);
    let listed = engine.list_contacts(&a, Some(lead)).await?;
    assert_eq!(listed.len(), 1);

    // Tenant-scoped only: a colleague may edit or delete.
    let updated = engine
        .update_contact(
            &b,
            created.contact.id,
            ContactPatch {
                title: Some(Some("Buyer".to_string())),
                ..ContactPatch::default()
            },
        )
        .await?;
    assert_eq!(updated.contact.title.as_deref(), Some("Buyer"));
    assert_validation(
        &engine
            .update_contact(
                &b,
                created.contact.id,
                ContactPatch {
                    phone: Some(Some("123".to_string())),
                    ..ContactPatch::default()
                },
            )
            .await,
    );

    let outsider = world.add_user(T2, "x@t2.example", &[Role::User]).await?;
    assert_not_found(&engine.delete_contact(&outsider, created.contact.id).await);
    engine.delete_contact(&b, created.contact.id).await?;
    assert!(engine.list_contacts(&a, Some(lead)).await?.is_empty());
    Ok(())
}
