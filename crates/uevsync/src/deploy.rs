//! The deployment run: list, fetch, reconcile.

use miette::Result;
use tracing::{info, warn};

use uevsync_blob::{BlobClient, FetchedScript, fetch_script};
use uevsync_scheduler::{ReconcileOutcome, Reconciler, SchtasksService, TaskService};

use crate::config::RunConfig;

/// Summary of one deployment run.
#[derive(Debug)]
pub struct DeployReport {
    /// Number of blobs in the container listing.
    pub listed: usize,
    /// The selected script and where it was downloaded.
    pub script: FetchedScript,
    /// What happened (or, on a dry run, would happen) to the task.
    pub outcome: ReconcileOutcome,
    /// Whether the scheduler was actually touched.
    pub applied: bool,
}

/// Build an HTTP client honoring the configured timeout.
pub fn blob_client(config: &RunConfig) -> Result<BlobClient> {
    let client = match config.http_timeout {
        Some(timeout) => BlobClient::with_timeout(timeout),
        None => BlobClient::new(),
    };
    client.map_err(|e| miette::miette!("failed to create HTTP client: {}", e))
}

/// Run the deployment against the host Task Scheduler.
pub async fn run(config: &RunConfig) -> Result<()> {
    let client = blob_client(config)?;
    let reconciler = Reconciler::new(SchtasksService::default());

    let report = execute(config, &client, &reconciler).await?;

    if report.applied {
        info!(
            outcome = %report.outcome,
            listed = report.listed,
            script = %report.script.path.display(),
            "deployment finished"
        );
    } else {
        info!(
            outcome = %report.outcome,
            listed = report.listed,
            script = %report.script.path.display(),
            "dry run finished, task scheduler untouched"
        );
    }
    Ok(())
}

/// List the container, fetch the script and reconcile the task.
#[tracing::instrument(skip_all, fields(script = %config.script_name, task = %config.task_name))]
pub async fn execute<S: TaskService>(
    config: &RunConfig,
    client: &BlobClient,
    reconciler: &Reconciler<S>,
) -> Result<DeployReport> {
    let records = client
        .list(&config.listing_url)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let script = fetch_script(client, &records, &config.script_name, &config.target_dir)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    if !script.downloaded {
        warn!(
            path = %script.path.display(),
            "script was not downloaded, the task will point at whatever is on disk"
        );
    }

    let desired = config.task_descriptor(&script.path);

    let outcome = if config.dry_run {
        let planned = reconciler.inspect(&desired).await.planned_outcome();
        info!(outcome = %planned, "dry run, not applying");
        planned
    } else {
        reconciler
            .reconcile(&desired)
            .await
            .map_err(|e| miette::miette!("{}", e))?
    };

    Ok(DeployReport {
        listed: records.len(),
        script,
        outcome,
        applied: !config.dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveTime;
    use uevsync_scheduler::{RegisteredTask, SchedulerError, TaskAction, TaskDescriptor};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records scheduler calls; holds at most one task.
    #[derive(Default)]
    struct RecordingScheduler {
        existing: Mutex<Option<RegisteredTask>>,
        created: Mutex<Vec<TaskDescriptor>>,
        updated: Mutex<Vec<TaskAction>>,
    }

    #[async_trait]
    impl TaskService for RecordingScheduler {
        async fn query(&self, _full_name: &str) -> Result<Option<RegisteredTask>, SchedulerError> {
            Ok(self.existing.lock().unwrap().clone())
        }

        async fn create(&self, descriptor: &TaskDescriptor) -> Result<(), SchedulerError> {
            self.created.lock().unwrap().push(descriptor.clone());
            *self.existing.lock().unwrap() = Some(RegisteredTask {
                name: descriptor.full_name(),
                action: Some(descriptor.action.clone()),
                definition: String::new(),
            });
            Ok(())
        }

        async fn update_action(
            &self,
            _task: &RegisteredTask,
            action: &TaskAction,
        ) -> Result<(), SchedulerError> {
            self.updated.lock().unwrap().push(action.clone());
            Ok(())
        }
    }

    fn listing(server_uri: &str) -> String {
        format!(
            "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <EnumerationResults ContainerName=\"{server_uri}/scripts\"><Blobs>\
             <Blob><Name>Readme.txt</Name><Url>{server_uri}/scripts/Readme.txt</Url>\
             <LastModified>Mon, 27 Jun 2016 15:38:02 GMT</LastModified><Size>3</Size></Blob>\
             <Blob><Name>Set-Uev.ps1</Name><Url>{server_uri}/scripts/Set-Uev.ps1</Url>\
             <LastModified>Mon, 27 Jun 2016 15:38:02 GMT</LastModified><Size>20</Size></Blob>\
             </Blobs><NextMarker/></EnumerationResults>"
        )
    }

    async fn container(script_status: u16) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/scripts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&mock_server.uri())))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/scripts/Set-Uev.ps1"))
            .and(header("x-ms-version", "2017-11-09"))
            .respond_with(
                ResponseTemplate::new(script_status).set_body_string("Register-UevTemplate *.xml"),
            )
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn config(server_uri: &str, target_dir: &Path) -> RunConfig {
        RunConfig {
            listing_url: format!("{server_uri}/scripts?restype=container&comp=list"),
            script_name: "Set-Uev.ps1".to_string(),
            target_dir: target_dir.to_path_buf(),
            task_name: "Download and Register UE-V Templates".to_string(),
            task_folder: "\\".to_string(),
            executable: "powershell.exe".to_string(),
            base_arguments: "-ExecutionPolicy Bypass".to_string(),
            trigger_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            http_timeout: None,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_first_run_downloads_and_creates_task() {
        let mock_server = container(200).await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(&mock_server.uri(), &dir.path().join("scripts"));
        let client = blob_client(&config).unwrap();
        let reconciler = Reconciler::new(RecordingScheduler::default());

        let report = execute(&config, &client, &reconciler).await.unwrap();

        assert_eq!(report.listed, 2);
        assert!(report.applied);
        assert!(report.script.downloaded);
        assert_eq!(report.outcome, ReconcileOutcome::Created);
        assert_eq!(
            std::fs::read_to_string(&report.script.path).unwrap(),
            "Register-UevTemplate *.xml"
        );

        let created = reconciler.service().created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Download and Register UE-V Templates");
        assert_eq!(
            created[0].action.arguments,
            format!("-ExecutionPolicy Bypass -File \"{}\"", report.script.path.display())
        );
    }

    #[tokio::test]
    async fn test_second_run_is_unchanged() {
        let mock_server = container(200).await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(&mock_server.uri(), dir.path());
        let client = blob_client(&config).unwrap();
        let reconciler = Reconciler::new(RecordingScheduler::default());

        execute(&config, &client, &reconciler).await.unwrap();
        let report = execute(&config, &client, &reconciler).await.unwrap();

        assert_eq!(report.outcome, ReconcileOutcome::Unchanged);
        assert_eq!(reconciler.service().created.lock().unwrap().len(), 1);
        assert!(reconciler.service().updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_scheduler_alone() {
        let mock_server = container(200).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&mock_server.uri(), dir.path());
        config.dry_run = true;
        let client = blob_client(&config).unwrap();
        let reconciler = Reconciler::new(RecordingScheduler::default());

        let report = execute(&config, &client, &reconciler).await.unwrap();

        assert!(!report.applied);
        assert_eq!(report.outcome, ReconcileOutcome::Created);
        assert!(reconciler.service().created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_still_reconciles() {
        let mock_server = container(403).await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(&mock_server.uri(), dir.path());
        let client = blob_client(&config).unwrap();
        let reconciler = Reconciler::new(RecordingScheduler::default());

        let report = execute(&config, &client, &reconciler).await.unwrap();

        assert!(!report.script.downloaded);
        assert!(!report.script.path.exists());
        assert_eq!(report.outcome, ReconcileOutcome::Created);
    }

    #[tokio::test]
    async fn test_missing_script_stops_before_scheduler() {
        let mock_server = container(200).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&mock_server.uri(), dir.path());
        config.script_name = "Missing.ps1".to_string();
        let client = blob_client(&config).unwrap();
        let reconciler = Reconciler::new(RecordingScheduler::default());

        let result = execute(&config, &client, &reconciler).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Missing.ps1"));
        assert!(reconciler.service().created.lock().unwrap().is_empty());
    }
}
