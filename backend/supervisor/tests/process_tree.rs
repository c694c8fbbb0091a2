//! Process-tree termination against real `sh` / `sleep` processes.
//!
//! The orphan sweep reaps every child of the test process, so tests that
//! spawn or sweep run one at a time behind `serial()`.

#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use toolkit_core::{ScanFlags, ScanRequest};
use toolkit_supervisor::{
    sweep_orphans, Disposition, JobConfig, KillTree, ProcessTable, ScanSupervisor,
    SupervisorConfig,
};

static PROCESS_LOCK: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    PROCESS_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn killer() -> KillTree {
    KillTree::with_poll_interval(Duration::from_millis(500), Duration::from_millis(20))
}

fn spawn_sh(script: &str) -> Child {
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .spawn()
        .expect("spawn sh")
}

fn is_alive(pid: u32) -> bool {
    ProcessTable::observe(&[pid]).identity(pid).is_some()
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_descendants(root: u32, count: usize) -> Vec<u32> {
    let mut found = Vec::new();
    let ready = wait_until(Duration::from_secs(5), || {
        found = ProcessTable::capture()
            .descendants_of(root)
            .into_iter()
            .map(|d| d.pid)
            .collect();
        found.len() >= count
    })
    .await;
    assert!(ready, "process {root} never spawned {count} descendants");
    found
}

async fn assert_all_dead(pids: &[u32]) {
    let dead = wait_until(Duration::from_secs(5), || pids.iter().all(|pid| !is_alive(*pid))).await;
    assert!(dead, "processes still alive: {:?}", pids.iter().filter(|p| is_alive(**p)).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_kill_tree_terminates_root_and_descendants() {
    let _guard = serial();
    let mut child = spawn_sh("sleep 300 & sleep 300 & wait");
    let root = child.id();
    let descendants = wait_for_descendants(root, 2).await;

    let report = killer().kill_tree(root).await;
    assert_eq!(report.root, root);
    assert!(report.is_complete());
    for pid in &descendants {
        assert!(report.disposition_of(*pid).is_some(), "descendant {pid} missing from report");
    }

    let mut all = descendants.clone();
    all.push(root);
    assert_all_dead(&all).await;
    child.wait().unwrap();
}

#[tokio::test]
async fn test_kill_tree_reaches_grandchildren() {
    let _guard = serial();
    let mut child = spawn_sh("sh -c 'sleep 300 & wait' & wait");
    let root = child.id();
    let descendants = wait_for_descendants(root, 2).await;

    killer().kill_tree(root).await;

    let mut all = descendants;
    all.push(root);
    assert_all_dead(&all).await;
    child.wait().unwrap();
}

#[tokio::test]
async fn test_kill_tree_escalates_when_sigterm_is_ignored() {
    let _guard = serial();
    // Ignored signal dispositions survive fork and exec, so both the
    // background `sleep` and the exec'd root ignore TERM.
    let mut child = spawn_sh("trap '' TERM; sleep 300 & exec sleep 300");
    let root = child.id();
    let descendants = wait_for_descendants(root, 1).await;

    let started = Instant::now();
    let report = killer().kill_tree(root).await;
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(report.disposition_of(root), Some(Disposition::ForceKilled));
    assert_eq!(report.count(Disposition::ForceKilled), 2);

    let mut all = descendants;
    all.push(root);
    assert_all_dead(&all).await;
    assert_eq!(child.wait().unwrap().signal(), Some(9));
}

#[tokio::test]
async fn test_kill_tree_on_exited_pid_is_harmless() {
    let _guard = serial();
    let mut child = spawn_sh("exit 0");
    let root = child.id();
    child.wait().unwrap();

    let report = killer().kill_tree(root).await;
    assert_eq!(report.disposition_of(root), Some(Disposition::AlreadyGone));
}

#[tokio::test]
async fn test_kill_tree_never_terminates_own_process() {
    let _guard = serial();
    let own = std::process::id();

    let report = killer().kill_tree(own).await;
    assert_eq!(report.disposition_of(own), Some(Disposition::SelfProtected));
    assert!(is_alive(own));
}

#[tokio::test]
async fn test_sweep_reaps_untracked_children() {
    let _guard = serial();
    let mut child = Command::new("sleep").arg("300").spawn().expect("spawn sleep");
    let pid = child.id();
    assert!(wait_until(Duration::from_secs(5), || is_alive(pid)).await);

    let reports = sweep_orphans(&killer(), std::process::id(), &[]).await;
    assert!(reports.iter().any(|report| report.root == pid));

    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(15));
}

#[tokio::test]
async fn test_cancel_all_with_nothing_running() {
    let _guard = serial();
    let supervisor = ScanSupervisor::default();
    let report = supervisor.cancel_all().await;
    assert_eq!(report.trees_terminated(), 0);
    assert_eq!(report.cleared, 0);
    assert!(supervisor.registry().is_empty());
}

fn sh_job(script: &str) -> SupervisorConfig {
    SupervisorConfig {
        job: JobConfig {
            program: "sh".to_string(),
            // `$0` is the job name; the scan flags land in `$1..`.
            args: vec!["-c".to_string(), script.to_string(), "wildfire".to_string()],
            working_dir: None,
        },
        kill_grace: Duration::from_millis(500),
        poll_interval: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_scan_completes_and_returns_to_idle() {
    let _guard = serial();
    let supervisor = ScanSupervisor::new(sh_job("test \"$1\" = --start"));
    let request = ScanRequest::new(ScanFlags::new(true, false, true), 3, None).unwrap();

    let outcome = supervisor.run_scan(request).await.unwrap();
    assert_eq!(outcome.total_steps, 78);
    assert!(outcome.exit.success());
    assert!(supervisor.snapshot().is_idle_default());
    assert!(supervisor.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_during_scan_kills_tree_and_resets() {
    let _guard = serial();
    let supervisor = Arc::new(ScanSupervisor::new(sh_job("sleep 300 & sleep 300 & wait")));
    let request = ScanRequest::new(ScanFlags::new(true, true, true), 1, None).unwrap();

    let scan = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run_scan(request).await })
    };

    assert!(wait_until(Duration::from_secs(5), || supervisor.registry().len() == 1).await);
    let job_pid = supervisor.registry().snapshot()[0].pid;
    let descendants = wait_for_descendants(job_pid, 2).await;

    let snap = supervisor.snapshot();
    assert!(snap.running);
    assert_eq!(snap.total_steps, 34);
    assert_eq!(snap.current_step, 1);
    for step in ["Amass", "Subfinder", "Httprobe"] {
        supervisor.advance(step, "example.com").unwrap();
    }
    assert_eq!(supervisor.snapshot().current_step, 4);

    let report = supervisor.cancel().await;
    assert_eq!(report.tracked.len(), 1);
    assert!(supervisor.registry().is_empty());
    assert!(supervisor.snapshot().is_idle_default());

    let outcome = tokio::time::timeout(Duration::from_secs(5), scan)
        .await
        .expect("scan task should finish after cancellation")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.total_steps, 34);
    assert!(supervisor.snapshot().is_idle_default());

    let mut all = descendants;
    all.push(job_pid);
    assert_all_dead(&all).await;
}

#[tokio::test]
async fn test_cancelled_scan_does_not_reset_a_newer_scan() {
    let _guard = serial();
    let supervisor = Arc::new(ScanSupervisor::new(sh_job("sleep 300")));
    let request = ScanRequest::new(ScanFlags::new(true, false, false), 1, None).unwrap();

    let scan = {
        let supervisor = Arc::clone(&supervisor);
        let request = request.clone();
        tokio::spawn(async move { supervisor.run_scan(request).await })
    };
    assert!(wait_until(Duration::from_secs(5), || supervisor.registry().len() == 1).await);

    // Reset the state without killing, then start a new scan before the old
    // job is cancelled.
    supervisor.state().stop_scan();
    let newer = supervisor
        .state()
        .start_scan(ScanFlags::new(false, true, false), 2, "Manual")
        .unwrap();

    supervisor.cancel_all().await;
    scan.await.unwrap().unwrap();

    assert_eq!(supervisor.state().run_id(), Some(newer.run_id));
    assert_eq!(supervisor.snapshot().total_steps, 16);
    supervisor.state().stop_scan();
}

#[tokio::test]
async fn test_collect_screenshots_runs_job_without_touching_state() {
    let _guard = serial();
    let supervisor = ScanSupervisor::new(sh_job("test \"$1\" = --screenshots"));

    let exit = supervisor.collect_screenshots().await.unwrap();
    assert!(exit.success());
    assert!(supervisor.registry().is_empty());
    assert!(supervisor.snapshot().is_idle_default());
}

#[tokio::test]
async fn test_status_stays_running_until_every_process_is_gone() {
    let _guard = serial();
    // Every process ignores TERM, so each tree costs a full grace period.
    let supervisor = Arc::new(ScanSupervisor::new(sh_job("trap '' TERM; exec sleep 300")));
    let request = ScanRequest::new(ScanFlags::new(true, true, true), 1, None).unwrap();

    let scan = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run_scan(request).await })
    };
    let screenshots = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.collect_screenshots().await })
    };
    assert!(wait_until(Duration::from_secs(5), || supervisor.registry().len() == 2).await);

    let mut orphan = spawn_sh("trap '' TERM; exec sleep 300");
    let mut pids: Vec<u32> = supervisor.registry().snapshot().iter().map(|p| p.pid).collect();
    pids.push(orphan.id());
    // Let each shell install its trap before signals start flying.
    sleep(Duration::from_millis(200)).await;

    let cancel = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.cancel().await })
    };

    let mut samples = 0;
    while !cancel.is_finished() {
        let running = supervisor.snapshot().running;
        let alive: Vec<u32> = pids.iter().copied().filter(|pid| is_alive(*pid)).collect();
        assert!(running || alive.is_empty(), "status went idle while {alive:?} still alive");
        assert!(
            supervisor.state().start_scan(ScanFlags::new(true, false, false), 1, "Manual").is_err(),
            "a scan started while cancellation was in flight"
        );
        samples += 1;
        sleep(Duration::from_millis(20)).await;
    }

    let report = cancel.await.unwrap();
    assert!(samples > 0);
    assert_eq!(report.tracked.len(), 2);
    assert!(report.orphans.iter().any(|tree| tree.root == orphan.id()));
    assert_eq!(report.count(Disposition::ForceKilled), 3);
    assert!(supervisor.snapshot().is_idle_default());
    assert!(supervisor.registry().is_empty());
    for pid in &pids {
        assert!(!is_alive(*pid), "process {pid} survived cancellation");
    }

    scan.await.unwrap().unwrap();
    screenshots.await.unwrap().unwrap();
    assert!(supervisor.snapshot().is_idle_default());
    assert_eq!(orphan.wait().unwrap().signal(), Some(9));
}
