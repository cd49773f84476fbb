//! Integration tests for the training loop: hook order, interruption and resume.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use toolbox_ml::MlError;
use toolbox_ml::data::{DataLoader, Dataset, Split};
use toolbox_ml::training::{Hooks, ResumePoint, TrainLoop, TrainingParts};

#[derive(Debug, Default)]
struct Model {
    seen: Vec<u32>,
}

#[derive(Debug)]
struct Criterion;

type Parts = TrainingParts<Model, Criterion>;
type Events = Rc<RefCell<Vec<String>>>;

fn build(epochs: usize, batches: u32) -> TrainLoop<Model, Vec<u32>, Criterion> {
    TrainLoop::builder()
        .model(Model::default())
        .train_loader((1..=batches).collect())
        .criterion(Criterion)
        .epochs(epochs)
        .build()
        .unwrap()
}

/// Hooks that record every call as a short string.
fn recording_hooks<'h>(events: &Events) -> Hooks<'h, Parts, u32> {
    let e1 = events.clone();
    let e2 = events.clone();
    let e3 = events.clone();
    let e4 = events.clone();
    let e5 = events.clone();
    let e6 = events.clone();
    let e7 = events.clone();
    Hooks::<Parts, u32>::new()
        .on_start_of_training(move |_| {
            e1.borrow_mut().push("start".into());
            Ok(())
        })
        .on_start_of_epoch(move |_, epoch| {
            e2.borrow_mut().push(format!("epoch {epoch}"));
            Ok(())
        })
        .on_start_of_batch(move |_, epoch, batch, _| {
            e3.borrow_mut().push(format!("batch {epoch}.{batch}"));
            Ok(())
        })
        .on_end_of_batch(move |parts, _, _, data| {
            parts.model.seen.push(*data);
            e4.borrow_mut().push("step".into());
            Ok(())
        })
        .on_end_of_epoch(move |_, epoch| {
            e5.borrow_mut().push(format!("end epoch {epoch}"));
            Ok(())
        })
        .on_end_of_training(move |_| {
            e6.borrow_mut().push("end".into());
            Ok(())
        })
        .on_interrupt(move |_, resume| {
            e7.borrow_mut()
                .push(format!("interrupt {}.{}", resume.epoch, resume.batch));
            Ok(())
        })
}

#[test]
fn hooks_fire_in_lifecycle_order() {
    let events = Events::default();
    let mut lp = build(2, 2);
    let mut hooks = recording_hooks(&events);

    let summary = lp.run(&mut hooks).unwrap();

    assert_eq!(summary.epochs_completed, 2);
    assert_eq!(summary.batches_run, 4);
    assert_eq!(summary.batches_skipped, 0);
    assert_eq!(
        *events.borrow(),
        vec![
            "start",
            "epoch 1",
            "batch 1.1",
            "step",
            "batch 1.2",
            "step",
            "end epoch 1",
            "epoch 2",
            "batch 2.1",
            "step",
            "batch 2.2",
            "step",
            "end epoch 2",
            "end",
        ]
    );
}

#[test]
fn resume_skips_earlier_batches_only_in_first_epoch() {
    let events = Events::default();
    let mut lp = build(3, 4);
    let mut hooks = recording_hooks(&events);

    let summary = lp.run_from(&mut hooks, ResumePoint::new(2, 3)).unwrap();
    drop(hooks);

    assert_eq!(summary.started_at, ResumePoint::new(2, 3));
    assert_eq!(summary.epochs_completed, 2);
    assert_eq!(summary.batches_skipped, 2);
    assert_eq!(summary.batches_run, 6);
    assert_eq!(lp.parts().model.seen, vec![3, 4, 1, 2, 3, 4]);
    // No start-of-training hook when resuming.
    assert_eq!(events.borrow().first().map(String::as_str), Some("epoch 2"));
    assert_eq!(events.borrow().last().map(String::as_str), Some("end"));
}

#[test]
fn start_past_last_epoch_runs_nothing() {
    let events = Events::default();
    let mut lp = build(2, 2);
    let mut hooks = recording_hooks(&events);

    let summary = lp.run_from(&mut hooks, ResumePoint::new(3, 1)).unwrap();

    assert_eq!(summary.epochs_completed, 0);
    assert_eq!(*events.borrow(), vec!["end"]);
}

#[test]
fn cancel_mid_epoch_reports_resume_point() {
    let events = Events::default();
    let mut lp = build(3, 5);
    let token = lp.cancellation_token();
    let mut hooks = recording_hooks(&events).on_end_of_batch(move |parts, epoch, batch, data| {
        parts.model.seen.push(*data);
        if epoch == 2 && batch == 3 {
            token.cancel();
        }
        Ok(())
    });

    let err = lp.run(&mut hooks).unwrap_err();
    drop(hooks);

    let interrupted = *err.as_interrupted().expect("run should be interrupted");
    assert_eq!((interrupted.epoch, interrupted.batch), (2, 4));
    assert_eq!(interrupted.resume_point(), ResumePoint::new(2, 4));
    assert_eq!(
        err.to_string(),
        "TrainingInterrupted, training was interrupted by user at epoch 2, batch 4."
    );
    assert_eq!(lp.parts().model.seen, vec![1, 2, 3, 4, 5, 1, 2, 3]);

    let log = events.borrow();
    assert_eq!(log.last().map(String::as_str), Some("interrupt 2.4"));
    assert!(!log.iter().any(|e| e == "end"));
}

#[test]
fn cancel_at_epoch_boundary_and_resume() {
    let events = Events::default();
    let mut lp = build(3, 2);
    let token = lp.cancellation_token();
    let mut hooks = recording_hooks(&events).on_end_of_epoch(move |_, epoch| {
        if epoch == 1 {
            token.cancel();
        }
        Ok(())
    });

    let err = lp.run(&mut hooks).unwrap_err();
    let interrupted = *err.as_interrupted().unwrap();
    assert_eq!((interrupted.epoch, interrupted.batch), (2, 0));
    assert_eq!(
        err.to_string(),
        "TrainingInterrupted, training was interrupted by user at epoch 2."
    );

    // A fresh token lets the same loop pick up where it stopped.
    lp.reset_cancellation();
    let summary = lp.run_from(&mut hooks, interrupted.resume_point()).unwrap();
    drop(hooks);

    assert_eq!(summary.epochs_completed, 2);
    assert_eq!(summary.batches_skipped, 0);
    assert_eq!(lp.parts().model.seen, vec![1, 2, 1, 2, 1, 2]);
}

#[test]
fn hook_error_aborts_run() {
    let mut lp = build(5, 3);
    let mut hooks = lp
        .hooks()
        .on_start_of_batch(|_, epoch, batch, _| {
            if epoch == 1 && batch == 2 {
                Err(MlError::training("loss is NaN"))
            } else {
                Ok(())
            }
        });

    let err = lp.run(&mut hooks).unwrap_err();
    assert!(matches!(err, MlError::Training(ref msg) if msg == "loss is NaN"));
    assert!(err.as_interrupted().is_none());
}

#[test]
fn loop_over_dataset_subset() {
    let ds = Dataset::with_split(
        "numbers",
        (0..10u32).collect::<Vec<_>>(),
        &Split::fractions([("train", 0.8)]),
    )
    .unwrap();
    let train = ds.subset("train").unwrap();
    let loader = DataLoader::new(train, 3).unwrap();

    let mut lp = TrainLoop::builder()
        .model(Vec::<u32>::new())
        .train_loader(loader)
        .criterion(())
        .epochs(1)
        .build()
        .unwrap();
    let mut hooks = lp.hooks().on_end_of_batch(|parts, _, _, batch| {
        parts.model.extend(batch.iter().copied());
        Ok(())
    });
    let summary = lp.run(&mut hooks).unwrap();
    drop(hooks);

    assert_eq!(summary.batches_run, 3);
    assert_eq!(lp.parts().model, (0..8).collect::<Vec<u32>>());
}

/// Every `(epoch, batch, records)` a loop over a shuffled loader processes.
fn shuffled_batches(
    dataset: &Dataset<u32>,
    start: ResumePoint,
) -> Vec<(usize, usize, Vec<u32>)> {
    let loader = DataLoader::new(dataset, 3).unwrap().shuffle(Some(0));
    let mut lp = TrainLoop::builder()
        .model(Vec::new())
        .train_loader(loader)
        .criterion(())
        .epochs(2)
        .build()
        .unwrap();
    let mut hooks = lp.hooks().on_end_of_batch(|parts, epoch, batch, data| {
        parts.model.push((epoch, batch, data.clone()));
        Ok(())
    });
    lp.run_from(&mut hooks, start).unwrap();
    drop(hooks);
    lp.into_parts().0.model
}

#[test]
fn resumed_run_sees_the_same_shuffled_batches() {
    let ds = Dataset::new("numbers", (0..12u32).collect());

    let full = shuffled_batches(&ds, ResumePoint::START);
    let resumed = shuffled_batches(&ds, ResumePoint::new(2, 3));

    let expected: Vec<_> = full
        .into_iter()
        .filter(|(epoch, batch, _)| *epoch == 2 && *batch >= 3)
        .collect();
    assert_eq!(expected.len(), 2);
    assert_eq!(resumed, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupt_listener_stops_once_token_is_cancelled() {
    let lp = build(1, 1);
    let listener = lp.listen_for_interrupt();
    lp.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), listener)
        .await
        .expect("listener should exit after cancellation")
        .unwrap();
    assert!(lp.cancellation_token().is_cancelled());
}
