use loam::{run_pipeline, Phase, PipelineConfig, PipelineError};
use std::fs;
use std::path::Path;

fn write_inputs(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let logs = root.join("logs");
    let profiles = root.join("profiles");
    fs::create_dir_all(&logs).unwrap();
    fs::create_dir_all(&profiles).unwrap();

    let mut a = String::new();
    for ts in 100..105 {
        a.push_str(&format!("u1\tpost\tc1\t{ts}\n"));
    }
    a.push_str("u1\tlike\tc2\t105\n");
    a.push_str("u2\tpost\tc2\t106\n");
    a.push_str("u2\tlike\tc1\t107\n");
    a.push_str("u3\tshare\tc1\t108\n");
    a.push_str("bogus line\n"); // wrong field count
    a.push_str("u4\tlogin\tc9\t109\n"); // unknown action
    fs::write(logs.join("a.tsv"), a).unwrap();

    fs::write(
        logs.join("b.tsv"),
        "u3\tlike\tc3\t110\nu4\tcomment\tc3\t111\nu5\tlike\tc4\t112\n",
    )
    .unwrap();

    fs::write(
        profiles.join("profiles.tsv"),
        "u1\t30\tX\nu2\t25\tY\nu9\t40\tZ\n",
    )
    .unwrap();

    (logs, profiles)
}

fn read_rows_in_order(dir: &Path) -> Vec<String> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    let mut rows = Vec::new();
    for f in files {
        rows.extend(fs::read_to_string(f).unwrap().lines().map(str::to_string));
    }
    rows
}

fn read_rows_sorted(dir: &Path) -> Vec<String> {
    let mut rows = read_rows_in_order(dir);
    rows.sort();
    rows
}

#[test]
fn five_phase_pipeline_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let (logs, profiles) = write_inputs(tmp.path());
    let cfg = PipelineConfig::new(logs, profiles, tmp.path().join("work"));

    let report = run_pipeline(&cfg).unwrap();
    assert_eq!(report.phases.len(), 5);
    assert!(report.failed.is_none());

    // Conservation: valid + rejected == total input records.
    let validate = &report.phases[0];
    assert_eq!(validate.phase, "validate");
    assert_eq!(validate.records_in, 14);
    assert_eq!(validate.rejected, 2);
    assert_eq!(validate.records_out, 12);
    assert_eq!(validate.records_out + validate.rejected, validate.records_in);

    // Activity compilation: one row per user.
    assert_eq!(
        read_rows_sorted(&cfg.phase_output(Phase::Activity)),
        vec![
            "u1\t5\t1\t0\t0",
            "u2\t1\t1\t0\t0",
            "u3\t0\t1\t1\t0",
            "u4\t0\t0\t0\t1",
            "u5\t0\t1\t0\t0",
        ]
    );

    // Rank: post count descending, user id ascending on ties, single file.
    assert_eq!(
        read_rows_in_order(&cfg.phase_output(Phase::Rank)),
        vec![
            "u1\t5\t1\t0\t0",
            "u2\t1\t1\t0\t0",
            "u3\t0\t1\t1\t0",
            "u4\t0\t0\t0\t1",
            "u5\t0\t1\t0\t0",
        ]
    );

    // Trending: engagement per id is c1=2, c2=1, c3=1, c4=1; the 90th
    // percentile of [1,1,1,2] is 2, so only c1 trends.
    let trending = &report.phases[3];
    assert_eq!(trending.threshold, Some(2));
    assert_eq!(
        read_rows_in_order(&cfg.phase_output(Phase::Trending)),
        vec!["c1\t2"]
    );

    // Join: inner semantics; u3/u4/u5 lack profiles, u9 lacks activity.
    let join = &report.phases[4];
    assert_eq!(join.unmatched, 4);
    assert_eq!(join.records_out, 2);
    assert_eq!(
        read_rows_sorted(&cfg.phase_output(Phase::Join)),
        vec!["u1\t5\t1\t0\t0\t30\tX", "u2\t1\t1\t0\t0\t25\tY"]
    );

    // Artifacts: execution report and per-phase skew reports.
    assert!(cfg.report_path().is_file());
    assert!(cfg.work_dir.join("reports").join("validate_skew.json").is_file());
    let body = fs::read_to_string(cfg.report_path()).unwrap();
    assert!(body.contains("\"phase\": \"join\""));
}

#[test]
fn rerun_on_identical_input_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let (logs, profiles) = write_inputs(tmp.path());

    let cfg1 = PipelineConfig::new(logs.clone(), profiles.clone(), tmp.path().join("w1"));
    let cfg2 = PipelineConfig::new(logs, profiles, tmp.path().join("w2"));
    let r1 = run_pipeline(&cfg1).unwrap();
    let r2 = run_pipeline(&cfg2).unwrap();

    assert_eq!(r1.phases[3].threshold, r2.phases[3].threshold);
    for phase in [Phase::Rank, Phase::Trending, Phase::Join] {
        assert_eq!(
            read_rows_in_order(&cfg1.phase_output(phase)),
            read_rows_in_order(&cfg2.phase_output(phase)),
            "phase {phase} diverged between runs"
        );
    }
}

#[test]
fn failed_phase_halts_pipeline_and_reports_cause() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = tmp.path().join("logs");
    let profiles = tmp.path().join("profiles");
    fs::create_dir_all(&logs).unwrap();
    fs::create_dir_all(&profiles).unwrap();
    // Invalid UTF-8 makes the validate shard unreadable.
    fs::write(logs.join("bad.tsv"), [0xffu8, 0xfe, 0x01]).unwrap();

    let cfg = PipelineConfig::new(logs, profiles, tmp.path().join("work"));
    let err = run_pipeline(&cfg).unwrap_err();
    match err {
        PipelineError::PhaseFailed { phase, .. } => assert_eq!(phase, "validate"),
        other => panic!("unexpected error: {other}"),
    }

    // Report still written, naming the failing phase; no downstream output.
    let body = fs::read_to_string(cfg.report_path()).unwrap();
    assert!(body.contains("\"phase\": \"validate\""));
    assert!(!cfg.phase_output(Phase::Activity).exists());
}
