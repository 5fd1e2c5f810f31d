//! End-to-end runs of the sequencing engine against the simulated bench.
//!
//! All tests run with a paused tokio clock, so multi-minute warm-ups and
//! exposures complete instantly while keeping real timeout semantics.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calseq::error::CalError;
use calseq::keyword::{keywords, services, KeywordStore};
use calseq::lamp::LampPortMap;
use calseq::mock::MockKeywordStore;
use calseq::sequencer::{RunPlan, Sequencer};

fn write_sequence(dir: &tempfile::TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    path
}

fn plan(files: Vec<PathBuf>) -> RunPlan {
    RunPlan {
        files,
        count: 1,
        lamps_off: false,
        no_exposure: false,
    }
}

#[tokio::test(start_paused = true)]
async fn powers_each_lamp_once_and_waits_longest_warm_up() {
    let dir = tempfile::tempdir().unwrap();
    let file1 = write_sequence(
        &dir,
        "ugold.yaml",
        "OctagonSource: U_gold\nWarmUp: 30\nExptime: 0.0\n",
    );
    let file2 = write_sequence(
        &dir,
        "thdaily.yaml",
        "OctagonSource: Th_daily\nWarmUp: 45\nExptime: 0.0\n",
    );

    let store = Arc::new(MockKeywordStore::new());
    let sequencer = Sequencer::new(store.clone(), LampPortMap::default());
    let mut plan = plan(vec![file1, file2]);
    plan.no_exposure = true;

    let started = tokio::time::Instant::now();
    sequencer.run(&plan).await.unwrap();
    let elapsed = started.elapsed();

    // A single shared warm-up sized for the slower lamp (45s), not 30+45.
    assert!(elapsed >= Duration::from_secs(45), "elapsed = {elapsed:?}");
    assert!(elapsed < Duration::from_secs(46), "elapsed = {elapsed:?}");

    // Each lamp powered exactly once.
    assert_eq!(store.write_count(services::POWER, "OUTLET_CAL2_7").await, 1);
    assert_eq!(store.write_count(services::POWER, "OUTLET_CAL2_6").await, 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_files_power_their_shared_lamp_once() {
    let dir = tempfile::tempdir().unwrap();
    let file1 = write_sequence(
        &dir,
        "a.yaml",
        "OctagonSource: U_gold\nWarmUp: 1\nExptime: 0.0\n",
    );
    let file2 = write_sequence(
        &dir,
        "b.yaml",
        "OctagonSource: U_gold\nWarmUp: 1\nExptime: 0.0\nND1: \"OD 0.1\"\n",
    );

    let store = Arc::new(MockKeywordStore::new());
    let mut plan = plan(vec![file1, file2]);
    plan.no_exposure = true;
    Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan)
        .await
        .unwrap();

    assert_eq!(store.write_count(services::POWER, "OUTLET_CAL2_7").await, 1);
}

#[tokio::test(start_paused = true)]
async fn dry_run_triggers_no_exposures_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_sequence(
        &dir,
        "dry.yaml",
        "OctagonSource: Th_gold\nWarmUp: 1\nExptime: 10.0\nTriggerRed: true\nnExp: 3\n",
    );

    let store = Arc::new(MockKeywordStore::new());
    let mut plan = plan(vec![file]);
    plan.no_exposure = true;
    Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan)
        .await
        .unwrap();

    // Zero Start writes; the detector never left Ready.
    assert_eq!(store.write_count(services::EXPOSURE, keywords::EXPOSE).await, 0);
}

#[tokio::test(start_paused = true)]
async fn full_run_takes_the_requested_exposures() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_sequence(
        &dir,
        "full.yaml",
        concat!(
            "OctagonSource: U_daily\n",
            "WarmUp: 2\n",
            "Exptime: 1.0\n",
            "TriggerRed: true\n",
            "TriggerGreen: true\n",
            "SSS_Science: true\n",
            "TS_Scrambler: true\n",
            "nExp: 2\n",
        ),
    );

    let store = Arc::new(MockKeywordStore::new());
    Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan(vec![file]))
        .await
        .unwrap();

    assert_eq!(store.write_count(services::EXPOSURE, keywords::EXPOSE).await, 2);
}

#[tokio::test(start_paused = true)]
async fn repeat_count_multiplies_exposures() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_sequence(
        &dir,
        "rep.yaml",
        "OctagonSource: U_daily\nWarmUp: 1\nExptime: 0.5\nnExp: 1\n",
    );

    let store = Arc::new(MockKeywordStore::new());
    let mut plan = plan(vec![file]);
    plan.count = 3;
    Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan)
        .await
        .unwrap();

    assert_eq!(store.write_count(services::EXPOSURE, keywords::EXPOSE).await, 3);
}

#[tokio::test(start_paused = true)]
async fn nd1_mismatch_aborts_before_nd2() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_sequence(
        &dir,
        "nd.yaml",
        concat!(
            "OctagonSource: Th_daily\n",
            "WarmUp: 1\n",
            "Exptime: 1.0\n",
            "ND1: \"OD 0.1\"\n",
            "ND2: \"OD 0.3\"\n",
        ),
    );

    let store = Arc::new(MockKeywordStore::new());
    store
        .set_read_override(services::MOTION, keywords::ND1POS, "OD 2.0".into())
        .await;
    let err = Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan(vec![file]))
        .await
        .unwrap_err();

    assert!(matches!(err, CalError::Verification { .. }), "got {err}");
    // Nothing after the failing step ran.
    assert_eq!(store.write_count(services::MOTION, keywords::ND2POS).await, 0);
    assert_eq!(store.write_count(services::EXPOSURE, keywords::EXPOSE).await, 0);
}

#[tokio::test(start_paused = true)]
async fn missing_sequence_file_fails_before_device_interaction() {
    let store = Arc::new(MockKeywordStore::new());
    let err = Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan(vec![PathBuf::from("/no/such/sequence.yaml")]))
        .await
        .unwrap_err();

    assert!(matches!(err, CalError::ResourceNotFound(_)), "got {err}");
    assert!(store.writes().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn lamps_off_flag_powers_lamps_back_down() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_sequence(
        &dir,
        "off.yaml",
        "OctagonSource: BrdbandFiber\nWarmUp: 1\nExptime: 0.0\n",
    );

    let store = Arc::new(MockKeywordStore::new());
    let mut plan = plan(vec![file]);
    plan.no_exposure = true;
    plan.lamps_off = true;
    Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan)
        .await
        .unwrap();

    // One On write and one Off write to the broadband fiber outlet.
    assert_eq!(store.write_count(services::POWER, "OUTLET_CAL2_2").await, 2);
    let state = store.read(services::POWER, "OUTLET_CAL2_2").await.unwrap();
    assert_eq!(state.as_str(), Some("Off"));
}

#[tokio::test(start_paused = true)]
async fn no_outlet_lamp_runs_without_power_writes() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_sequence(
        &dir,
        "etalon.yaml",
        "OctagonSource: EtalonFiber\nWarmUp: 1\nExptime: 0.0\n",
    );

    let store = Arc::new(MockKeywordStore::new());
    let mut plan = plan(vec![file]);
    plan.no_exposure = true;
    plan.lamps_off = true;
    Sequencer::new(store.clone(), LampPortMap::default())
        .run(&plan)
        .await
        .unwrap();

    let power_writes = store
        .writes()
        .await
        .iter()
        .filter(|w| w.service == services::POWER)
        .count();
    assert_eq!(power_writes, 0);
}
