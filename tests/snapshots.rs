use devsim::models::{BoundedQueue, Collector, Generator, Processor, SerializableState};
use devsim::simulator::{ExecutionType, SysExecutor};
use devsim::snapshot::{ModelSnapshot, SnapshotManager};
use devsim::utils::errors::SimulationError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A generator feeding a bounded queue that dispatches to a single worker;
/// completions free the worker and are tallied by a collector.
fn pipeline(mut simulation: SysExecutor) -> Result<SysExecutor, SimulationError> {
    simulation.insert_input_port("start");
    simulation.register_entity(Box::new(Generator::new("Gen", 1.0, Some(6), "job")))?;
    simulation.register_entity(Box::new(BoundedQueue::new("Queue", 10, 1)))?;
    simulation.register_entity(Box::new(Processor::new("Worker0", 0, 2.0)))?;
    simulation.register_entity(Box::new(Collector::new("Done", "done")))?;
    couple_pipeline(&mut simulation)?;
    Ok(simulation)
}

fn couple_pipeline(simulation: &mut SysExecutor) -> Result<(), SimulationError> {
    simulation.coupling_relation(None, "start", Some("Gen"), "start")?;
    simulation.coupling_relation(Some("Gen"), "job", Some("Queue"), "job_in")?;
    simulation.coupling_relation(Some("Queue"), "worker0", Some("Worker0"), "in")?;
    simulation.coupling_relation(Some("Worker0"), "next", Some("Queue"), "worker_free")?;
    simulation.coupling_relation(Some("Worker0"), "next", Some("Done"), "done")?;
    Ok(())
}

fn pipeline_restorers() -> SnapshotManager {
    let mut manager = SnapshotManager::default();
    manager.register_restorer("Gen", |name, _| {
        Ok(Box::new(Generator::new(name, 1.0, None, "job")))
    });
    manager.register_restorer("Queue", |name, _| {
        Ok(Box::new(BoundedQueue::new(name, 10, 1)))
    });
    manager.register_restorer("Worker0", |name, _| {
        Ok(Box::new(Processor::new(name, 0, 2.0)))
    });
    manager.register_restorer("Done", |name, _| {
        Ok(Box::new(Collector::new(name, "done")))
    });
    manager
}

fn counters(simulation: &SysExecutor) -> Result<(u64, u64, u64, u64), SimulationError> {
    let emitted = simulation.model_snapshot("Gen")?.state["emitted"]
        .as_u64()
        .unwrap_or_default();
    let queue = simulation.model_snapshot("Queue")?.state;
    let dispatched = queue["dispatched"].as_u64().unwrap_or_default();
    let dropped = queue["dropped"].as_u64().unwrap_or_default();
    let completions = simulation.model_snapshot("Done")?.state["received"]
        .as_array()
        .map_or(0, Vec::len) as u64;
    Ok((emitted, dispatched, dropped, completions))
}

#[test]
fn restored_run_is_indistinguishable_from_an_uninterrupted_one(
) -> Result<(), SimulationError> {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut original = pipeline(SysExecutor::new(1.0, ExecutionType::VirtualTime))?;
    original.insert_external_event("start", None)?;
    original.simulate(7)?;
    original.snapshot_simulation("pipeline", dir.path())?;
    original.simulate(100)?;

    let mut restored = SysExecutor::restore(
        &dir.path().join("pipeline.json"),
        ExecutionType::VirtualTime,
        pipeline_restorers(),
    )?;
    restored.simulate(100)?;

    assert_eq!(restored.global_time(), original.global_time());
    assert_eq!(counters(&restored)?, counters(&original)?);
    assert_eq!(
        restored.model_snapshot("Done")?.state["received"],
        original.model_snapshot("Done")?.state["received"],
    );
    assert_eq!(restored.model_names(), original.model_names());
    Ok(())
}

#[test]
fn restore_without_a_registered_restorer_fails() -> Result<(), SimulationError> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut simulation = pipeline(SysExecutor::new(1.0, ExecutionType::VirtualTime))?;
    simulation.insert_external_event("start", None)?;
    simulation.simulate(4)?;
    simulation.snapshot_simulation("pipeline", dir.path())?;

    let mut partial = SnapshotManager::default();
    partial.register_restorer("Gen", |name, _| {
        Ok(Box::new(Generator::new(name, 1.0, None, "job")))
    });
    assert!(matches!(
        SysExecutor::restore(
            &dir.path().join("pipeline.json"),
            ExecutionType::VirtualTime,
            partial,
        ),
        Err(SimulationError::MissingRestorer)
    ));
    Ok(())
}

#[test]
fn queue_widens_while_paused_and_resumes_with_both_workers(
) -> Result<(), SimulationError> {
    init_tracing();
    let mut simulation = pipeline(SysExecutor::new(1.0, ExecutionType::VirtualTime))?;
    simulation.insert_external_event("start", None)?;
    simulation.simulate(6)?;
    simulation.simulation_stop();

    // Swap the queue for a wider one built from its own snapshot, then
    // re-establish the couplings the removal dropped and add the worker
    let snapshot = simulation.model_snapshot("Queue")?;
    simulation.remove_entity("Queue")?;
    let mut widened = BoundedQueue::new("Queue", 10, 2);
    widened.restore_state(&snapshot.state)?;
    simulation.register_entity_restored(Box::new(widened), &snapshot)?;
    simulation.register_entity(Box::new(Processor::new("Worker1", 1, 2.0)))?;
    couple_pipeline(&mut simulation)?;
    simulation.coupling_relation(Some("Queue"), "worker1", Some("Worker1"), "in")?;
    simulation.coupling_relation(Some("Worker1"), "next", Some("Queue"), "worker_free")?;
    simulation.coupling_relation(Some("Worker1"), "next", Some("Done"), "done")?;

    simulation.simulate(200)?;

    let (emitted, dispatched, dropped, completions) = counters(&simulation)?;
    assert_eq!(emitted, 6);
    assert_eq!(dropped, 0);
    assert_eq!(dispatched, 6);
    assert_eq!(completions, 6);
    let occupancy = simulation.model_snapshot("Queue")?.state["jobs"]
        .as_array()
        .map_or(0, Vec::len);
    assert_eq!(occupancy, 0);
    for worker in ["Worker0", "Worker1"] {
        let processed = simulation.model_snapshot(worker)?.state["processed"]
            .as_u64()
            .unwrap_or_default();
        assert!(processed > 0, "{worker} never served a job after the widening");
    }
    Ok(())
}

#[test]
fn time_condition_writes_model_snapshot_files_during_the_run(
) -> Result<(), SimulationError> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut manager = SnapshotManager::new(dir.path());
    manager.register_snapshot_condition("Gen", |global_time| global_time == 2.0);

    let mut simulation =
        SysExecutor::with_snapshot_manager(1.0, ExecutionType::VirtualTime, manager);
    simulation.insert_input_port("start");
    simulation.register_entity(Box::new(Generator::new("Gen", 1.0, Some(4), "job")))?;
    simulation.register_entity(Box::new(Collector::new("Recv", "recv")))?;
    simulation.coupling_relation(None, "start", Some("Gen"), "start")?;
    simulation.coupling_relation(Some("Gen"), "job", Some("Recv"), "recv")?;
    simulation.insert_external_event("start", None)?;
    simulation.simulate(20)?;

    let written = dir.path().join("Gen_2.json");
    assert!(written.exists());
    let snapshot = ModelSnapshot::read(&written)?;
    assert_eq!(snapshot.name, "Gen");
    assert_eq!(snapshot.cur_state, "Generate");
    assert_eq!(snapshot.state["emitted"].as_u64(), Some(3));
    Ok(())
}
