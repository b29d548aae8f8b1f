//! End-to-end scan sessions over the in-memory mocks, driven through the
//! public orchestrator API: preprocess → crawl → probe → diff → store →
//! merged report, plus the persisted run log.

use std::collections::HashMap;
use std::sync::Arc;

use monsterinc_common::config::{MonsterIncConfig, ScanBatchConfig};
use monsterinc_common::types::ScanStatus;
use monsterinc_scan::cancel::CancelToken;
use monsterinc_scan::testing::{
    MockCrawler, MockProbeRunner, MockProbeWriter, MockReportRenderer, MockUrlDiffer,
};
use monsterinc_scan::traits::{
    Crawler, CrawlerFactory, ProbeRunner, ProbeRunnerFactory, ProbeWriter, ReportRenderer,
};
use monsterinc_scan::{ScanOrchestrator, TargetSource};

struct Session {
    orchestrator: ScanOrchestrator,
    writer: Arc<MockProbeWriter>,
    reporter: Arc<MockReportRenderer>,
}

fn session(config: MonsterIncConfig, crawler: Arc<MockCrawler>) -> Session {
    let crawler_factory: CrawlerFactory = {
        let crawler = crawler.clone();
        Arc::new(move |_config| Ok(crawler.clone() as Arc<dyn Crawler>))
    };
    let probe_factory: ProbeRunnerFactory =
        Arc::new(|_config, _root| Ok(Arc::new(MockProbeRunner::ok()) as Arc<dyn ProbeRunner>));

    let writer = Arc::new(MockProbeWriter::default());
    let reporter = Arc::new(MockReportRenderer::default());
    let orchestrator = ScanOrchestrator::new(
        config,
        crawler_factory,
        probe_factory,
        Arc::new(MockUrlDiffer::all_new()),
        Some(writer.clone() as Arc<dyn ProbeWriter>),
        Some(reporter.clone() as Arc<dyn ReportRenderer>),
    );
    Session {
        orchestrator,
        writer,
        reporter,
    }
}

#[tokio::test]
async fn full_session_attributes_roots_partitions_writes_and_logs() {
    let data_dir = tempfile::tempdir().unwrap();
    std::env::set_var("DATA_DIR", data_dir.path());

    let crawler = Arc::new(
        MockCrawler::new(vec![
            "https://a.com/admin".to_string(),
            "https://b.com/login".to_string(),
        ])
        .with_root_targets(HashMap::from([
            ("https://a.com/admin".to_string(), "https://a.com/".to_string()),
            ("https://b.com/login".to_string(), "https://b.com/".to_string()),
        ])),
    );
    let s = session(MonsterIncConfig::default(), crawler);

    let source = TargetSource::List(vec![
        "https://a.com/".to_string(),
        "https://b.com/".to_string(),
    ]);
    let result = s
        .orchestrator
        .run(&CancelToken::new(), source, "nightly-1")
        .await
        .unwrap();

    assert_eq!(result.summary.status, ScanStatus::Completed);
    assert_eq!(result.summary.probe_stats.total_probed, 4);
    assert_eq!(result.summary.probe_stats.successful, 4);
    assert_eq!(result.summary.diff_stats.new, 4);

    // One write per hostname, both under the session id, every persisted
    // probe annotated with a status.
    let mut writes = s.writer.writes();
    writes.sort();
    assert_eq!(
        writes,
        vec![
            ("nightly-1".to_string(), "a.com".to_string(), 2),
            ("nightly-1".to_string(), "b.com".to_string(), 2),
        ]
    );

    // Merged report rendered once with every probe.
    assert_eq!(s.reporter.generated(), vec![("nightly-1".to_string(), 4)]);
    assert_eq!(
        result.report_paths,
        vec![std::path::PathBuf::from("reports/nightly-1.html")]
    );

    // The run log landed on disk with the session timeline.
    let log_path = data_dir.path().join("scan-runs").join("nightly-1.json");
    let raw = std::fs::read_to_string(&log_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["session_id"], "nightly-1");
    let events: Vec<&str> = parsed["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert!(events.contains(&"targets_loaded"));
    assert!(events.contains(&"batch_started"));
    assert!(events.contains(&"batch_completed"));
    assert!(events.contains(&"report_written"));

    std::env::remove_var("DATA_DIR");
}

#[tokio::test]
async fn batched_session_survives_noisy_targets() {
    // Duplicates and junk in the target file shape: the preprocessor and
    // loader drop them, the batches still cover every distinct host.
    let config = MonsterIncConfig {
        scan_batch: ScanBatchConfig {
            threshold_size: 3,
            batch_size: 2,
            ..ScanBatchConfig::default()
        },
        ..MonsterIncConfig::default()
    };
    let s = session(config, Arc::new(MockCrawler::new(vec![])));

    let source = TargetSource::List(vec![
        "https://a.com/".to_string(),
        "HTTPS://A.com/".to_string(), // duplicate after normalization
        "https://b.com/".to_string(),
        "not a url".to_string(), // dropped at load
        "https://c.com/".to_string(),
        "https://d.com/".to_string(),
    ]);
    let result = s
        .orchestrator
        .run(&CancelToken::new(), source, "noisy-1")
        .await
        .unwrap();

    assert!(result.used_batching);
    assert_eq!(result.summary.status, ScanStatus::Completed);
    // 5 valid targets → 3 batches of (2, 2, 1); the duplicate dies in its
    // batch's preprocess, leaving 4 probed URLs.
    assert_eq!(result.total_batches, 3);
    assert_eq!(result.processed_batches, 3);
    assert_eq!(result.summary.probe_stats.total_probed, 4);

    let hosts: Vec<String> = s.writer.writes().into_iter().map(|(_, host, _)| host).collect();
    for host in ["a.com", "b.com", "c.com", "d.com"] {
        assert!(hosts.contains(&host.to_string()), "missing write for {host}");
    }
}
