mod common;

use std::{sync::Arc, time::Duration};

use common::{bundled, config, mock, MockContainer, MockDockerApi, PullChunk};
use rc2docker::{
    api::DockerApi,
    manager::{DockerManager, ImageInfoStore, ManagerStage, ManagerState},
    models::{ApiVersion, ContainerKind, ContainerOperation, ContainerState},
    DockerError, TransportError,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_manager_rejects_old_engine_before_touching_containers() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi {
        api_version: ApiVersion::new(1, 12),
        ..MockDockerApi::new()
    });
    let manager = DockerManager::with_api(api.clone(), config(home.path()));

    let err = manager.initialize(false).await.unwrap_err();

    assert_eq!(err.stage(), Some(ManagerStage::VersionCheck));
    assert!(matches!(
        err.root(),
        DockerError::IncompatibleVersion { found, .. } if *found == ApiVersion::new(1, 12)
    ));
    assert!(matches!(
        manager.state(),
        ManagerState::NotReady { stage: ManagerStage::VersionCheck, .. }
    ));
    assert_eq!(MockDockerApi::count(&api.calls.refresh), 0);
    assert_eq!(MockDockerApi::count(&api.calls.network_create), 0);
    assert_eq!(MockDockerApi::count(&api.calls.fetch_json), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_reports_engine_unavailable() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi {
        engine_down: true,
        ..MockDockerApi::new()
    });
    let manager = DockerManager::with_api(api, config(home.path()));

    let err = manager.initialize(false).await.unwrap_err();

    assert!(err.is_engine_unavailable());
    assert!(!manager.state().is_ready());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_operations_fail_before_initialization() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = mock();
    let manager = DockerManager::with_api(api.clone(), config(home.path()));

    let err = manager
        .perform_all(ContainerOperation::Start, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DockerError::NotReady(ManagerState::Uninitialized)));
    assert_eq!(MockDockerApi::count(&api.calls.perform), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_initialize_provisions_and_loads() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi::new().with_containers(vec![
        MockContainer::new(ContainerKind::Database, ContainerState::Running),
        MockContainer::new(ContainerKind::AppServer, ContainerState::Exited),
    ]));
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    let mut states = manager.subscribe_state();

    let pull_necessary = manager.initialize(false).await?;

    assert!(pull_necessary);
    assert_eq!(*states.borrow_and_update(), ManagerState::Ready);
    assert_eq!(MockDockerApi::count(&api.calls.network_create), 1);
    assert_eq!(MockDockerApi::count(&api.calls.volume_create), 1);
    assert_eq!(MockDockerApi::count(&api.calls.images), 1);

    let containers = manager.containers();
    assert_eq!(containers.len(), 3);
    assert_eq!(containers[0].state(), ContainerState::Running);
    assert_eq!(containers[1].state(), ContainerState::Exited);
    assert_eq!(containers[2].kind(), ContainerKind::Compute);
    assert_eq!(containers[2].state(), ContainerState::NotAvailable);

    // a second call is a no-op once ready
    manager.initialize(false).await?;
    assert_eq!(MockDockerApi::count(&api.calls.version), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_refresh_keeps_record_identity() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = mock();
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    let db = manager.container(ContainerKind::Database).unwrap();
    let mut db_state = db.subscribe();
    let mut changes = manager.subscribe_changes();

    api.set_state(ContainerKind::Database, ContainerState::Running);
    let reported = manager.refresh_containers().await?;

    let refreshed = manager.container(ContainerKind::Database).unwrap();
    assert!(Arc::ptr_eq(&db, &refreshed));
    assert_eq!(db.state(), ContainerState::Running);
    assert!(db_state.has_changed()?);
    assert_eq!(*db_state.borrow_and_update(), ContainerState::Running);

    assert_eq!(reported.len(), 1);
    let change = changes.recv().await?;
    assert_eq!(change.kind, ContainerKind::Database);
    assert_eq!(change.old_state, ContainerState::Exited);
    assert_eq!(change.new_state, ContainerState::Running);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_perform_all_runs_every_operation() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi {
        fail_kind: Some(ContainerKind::AppServer),
        ..MockDockerApi::new()
    });
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    let err = manager
        .perform_all(ContainerOperation::Start, None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(ManagerStage::Operation));
    assert!(matches!(err.root(), DockerError::Engine { status: 500, .. }));
    assert_eq!(MockDockerApi::count(&api.calls.perform), 3);

    let state = |kind| manager.container(kind).unwrap().state();
    assert_eq!(state(ContainerKind::Database), ContainerState::Running);
    assert_eq!(state(ContainerKind::AppServer), ContainerState::Exited);
    assert_eq!(state(ContainerKind::Compute), ContainerState::Running);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_serializes_operations_on_one_container() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi {
        perform_delay: Duration::from_millis(20),
        ..MockDockerApi::new()
    });
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    let (started, stopped) = tokio::join!(
        manager.perform(ContainerOperation::Start, ContainerKind::Compute),
        manager.perform(ContainerOperation::Stop, ContainerKind::Compute),
    );
    started?;
    stopped?;

    // the stop only reached the engine after the start returned
    assert_eq!(MockDockerApi::count(&api.calls.perform_max_in_flight), 1);
    assert_eq!(
        *api.performed.lock().unwrap(),
        vec![
            (ContainerOperation::Start, ContainerKind::Compute),
            (ContainerOperation::Stop, ContainerKind::Compute),
        ]
    );
    assert_eq!(
        manager.container(ContainerKind::Compute).unwrap().state(),
        ContainerState::Exited
    );

    // different containers still overlap
    manager.perform_all(ContainerOperation::Start, None).await?;
    assert_eq!(MockDockerApi::count(&api.calls.perform_max_in_flight), 3);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_api_perform_all_runs_every_operation() -> anyhow::Result<()> {
    let api = MockDockerApi {
        fail_kind: Some(ContainerKind::AppServer),
        ..MockDockerApi::new()
    };
    let records = api
        .refresh_containers(None)
        .await?
        .into_iter()
        .map(Arc::new)
        .collect::<Vec<_>>();

    let err = api
        .perform_all(ContainerOperation::Start, &records)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DockerError::Engine { status: 500, message: Some(ref message) } if message.contains("appserver")
    ));
    assert_eq!(MockDockerApi::count(&api.calls.perform), records.len());
    assert_eq!(api.performed.lock().unwrap().len(), 3);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_perform_skips_noops_and_missing_containers() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi::new().with_containers(vec![
        MockContainer::new(ContainerKind::Database, ContainerState::Running),
        MockContainer::new(ContainerKind::AppServer, ContainerState::Running),
    ]));
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    manager
        .perform_all(
            ContainerOperation::Start,
            Some(&[ContainerKind::Database, ContainerKind::AppServer]),
        )
        .await?;
    assert_eq!(MockDockerApi::count(&api.calls.perform), 0);

    let err = manager
        .perform(ContainerOperation::Pause, ContainerKind::Compute)
        .await;
    assert!(err.is_ok(), "pausing a missing container is a no-op");

    let err = manager
        .perform(ContainerOperation::Start, ContainerKind::Compute)
        .await
        .unwrap_err();
    assert!(matches!(err.root(), DockerError::InvalidArgument(_)));
    assert_eq!(MockDockerApi::count(&api.calls.perform), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_wait_until_running() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = mock();
    let manager = DockerManager::with_api(api, config(home.path()));
    manager.initialize(false).await?;

    let err = manager
        .wait_until_running(Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        DockerError::Transport(TransportError::Timeout(_))
    ));

    manager.perform_all(ContainerOperation::Start, None).await?;
    manager.wait_until_running(None).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_falls_back_to_bundled_manifest_when_offline() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = mock();
    let manager = DockerManager::with_api(api.clone(), config(home.path()));

    manager.initialize(false).await?;

    assert_eq!(manager.image_info(), Some(bundled()));
    assert!(manager.last_manifest_error().unwrap().contains("offline"));
    assert_eq!(MockDockerApi::count(&api.calls.fetch_json), 1);
    assert!(!ImageInfoStore::new(home.path()).path().exists());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_caches_newer_remote_manifest() -> anyhow::Result<()> {
    let home = tempdir()?;
    let mut remote = serde_json::to_value(bundled())?;
    remote["version"] = 3.into();

    let api = mock();
    *api.manifest.lock().unwrap() = Some(remote);
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    assert_eq!(*manager.image_info().unwrap().get_version(), 3);
    assert!(manager.last_manifest_error().is_none());

    // within the update interval the cache is used without fetching
    let offline = mock();
    let manager = DockerManager::with_api(offline.clone(), config(home.path()));
    manager.initialize(false).await?;

    assert_eq!(*manager.image_info().unwrap().get_version(), 3);
    assert_eq!(MockDockerApi::count(&offline.calls.fetch_json), 0);

    // an explicit refresh fetches again and keeps the cache when that fails
    manager.initialize(true).await?;
    assert_eq!(MockDockerApi::count(&offline.calls.fetch_json), 1);
    assert_eq!(*manager.image_info().unwrap().get_version(), 3);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_no_pull_when_images_installed() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = mock();
    api.install_bundled_images();
    let manager = DockerManager::with_api(api, config(home.path()));

    assert!(!manager.initialize(false).await?);
    assert!(manager.images_to_pull().is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_pull_images_then_prepare_containers() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = Arc::new(MockDockerApi::new().with_containers(vec![
        MockContainer::new(ContainerKind::Database, ContainerState::Exited),
        MockContainer::new(ContainerKind::AppServer, ContainerState::Exited),
    ]));
    *api.pull_chunks.lock().unwrap() = vec![
        PullChunk::Data("{\"status\":\"Pulling fs layer\",\"id\":\"a\"}\n"),
        PullChunk::Data(
            "{\"status\":\"Downloading\",\"id\":\"a\",\"progressDetail\":{\"current\":50,\"total\":100}}\n",
        ),
        PullChunk::Data("{\"status\":\"Download complete\",\"id\":\"a\"}\n"),
    ];
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    let needed = manager.images_to_pull().len();
    assert_eq!(needed, 3);

    let mut updates = Vec::new();
    manager
        .pull_images(CancellationToken::new(), |progress| {
            updates.push((progress.get_index(), progress.get_current_size()))
        })
        .await?;

    assert_eq!(MockDockerApi::count(&api.calls.pull), needed);
    assert!(updates.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(updates.last().map(|(index, _)| *index), Some(needed - 1));

    let created = manager.prepare_containers().await?;
    assert_eq!(created, vec![ContainerKind::Compute]);
    assert_eq!(
        manager.container(ContainerKind::Compute).unwrap().state(),
        ContainerState::Created
    );
    assert_eq!(MockDockerApi::count(&api.calls.create), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_removes_outdated_containers() -> anyhow::Result<()> {
    let home = tempdir()?;
    let db_image = bundled()
        .image(ContainerKind::Database)
        .unwrap()
        .get_id()
        .clone();
    let api = Arc::new(MockDockerApi::new().with_containers(vec![
        MockContainer::new(ContainerKind::Database, ContainerState::Running).with_image_id(db_image),
        MockContainer::new(ContainerKind::AppServer, ContainerState::Running),
        MockContainer::new(ContainerKind::Compute, ContainerState::Exited),
    ]));
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    let outdated: Vec<_> = manager
        .outdated_containers()
        .iter()
        .map(|record| record.kind())
        .collect();
    assert_eq!(outdated, vec![ContainerKind::AppServer, ContainerKind::Compute]);

    let removed = manager.remove_outdated_containers().await?;
    assert_eq!(removed, outdated);
    assert_eq!(
        *api.performed.lock().unwrap(),
        vec![
            (ContainerOperation::Stop, ContainerKind::AppServer),
            (ContainerOperation::Remove, ContainerKind::AppServer),
            (ContainerOperation::Remove, ContainerKind::Compute),
        ]
    );

    let app = manager.container(ContainerKind::AppServer).unwrap();
    assert_eq!(app.state(), ContainerState::NotAvailable);
    assert!(app.id().is_empty());
    assert_eq!(
        manager.container(ContainerKind::Database).unwrap().state(),
        ContainerState::Running
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manager_waits_for_database_and_backs_it_up() -> anyhow::Result<()> {
    let home = tempdir()?;
    let api = mock();
    api.exec_exit_codes.lock().unwrap().extend([2, 2]);
    let manager = DockerManager::with_api(api.clone(), config(home.path()));
    manager.initialize(false).await?;

    manager.wait_until_db_running().await?;
    assert_eq!(MockDockerApi::count(&api.calls.exec), 3);

    api.exec_exit_codes.lock().unwrap().extend([2, 2, 2]);
    assert!(manager.wait_until_db_running().await.is_err());

    let path = home.path().join("rc2.sql");
    let written = manager.backup_database(&path).await?;
    assert_eq!(written, api.exec_stdout.len() as u64);
    assert_eq!(tokio::fs::read(&path).await?, api.exec_stdout.to_vec());
    Ok(())
}
