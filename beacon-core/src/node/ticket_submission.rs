//! Concurrent ticket submission.
//!
//! The engine walks the ticket list in order and hands every ticket below
//! the natural threshold to the chain. Every ticket gets its own worker task
//! that makes the chain call and then awaits the returned
//! [`AsyncResult`](crate::utils::async_result::AsyncResult). The engine moves
//! on to the next ticket once the call has returned, so tickets reach the
//! chain in input order while slow confirmations never hold up the next
//! submission.
//!
//! A run moves through `Dispatching -> (Draining | Cancelled) -> Done`. Once
//! the cancel signal fires nothing new is started and the engine returns
//! without joining outstanding workers. Those are detached, not aborted: a
//! call already in flight completes and its failure still reaches the error
//! sink.

use super::Node;
use crate::chain::GroupInterface;
use crate::events::SubmissionErrorSender;
use beacon_sdk::objects::Ticket;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Phase of a submission run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Dispatching,
    Draining,
    Cancelled,
    Done,
}

/// What a submission run did. Informational only; per-ticket failures go to
/// the error sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Tickets handed to the chain.
    pub dispatched: usize,
    /// Tickets at or above the natural threshold, never sent.
    pub skipped: usize,
    /// Whether the run ended on the cancel signal.
    pub cancelled: bool,
}

impl Node {
    /// Submit `tickets` in order until all are dispatched and settled, or
    /// until `cancel` turns `true`.
    ///
    /// Failed submissions are pushed into `err_sink` without waiting; when
    /// the sink is full the error is dropped.
    pub async fn submit_tickets(
        &self,
        tickets: &[Ticket],
        group_interface: Arc<dyn GroupInterface>,
        mut cancel: watch::Receiver<bool>,
        err_sink: SubmissionErrorSender,
    ) -> SubmissionReport {
        let natural_threshold = &self.chain_config().natural_threshold;
        let mut report = SubmissionReport::default();
        let mut workers = JoinSet::new();
        let mut state = SubmissionState::Idle;

        debug!(tickets = tickets.len(), ?state, "Starting ticket submission");
        state = SubmissionState::Dispatching;

        for ticket in tickets {
            if *cancel.borrow() {
                state = SubmissionState::Cancelled;
                break;
            }

            if !ticket.is_below(natural_threshold) {
                debug!(
                    ticket_value = %ticket.value,
                    virtual_staker_index = ticket.proof.virtual_staker_index,
                    "Skipping ticket above natural threshold"
                );
                report.skipped += 1;
                continue;
            }

            // The chain call and its confirmation run on one worker; the next
            // ticket goes out once this call has returned.
            let (returned_tx, returned_rx) = oneshot::channel::<()>();
            let group_interface = group_interface.clone();
            let chain_ticket = ticket.to_chain_ticket();
            let err_sink = err_sink.clone();
            let virtual_staker_index = ticket.proof.virtual_staker_index;
            workers.spawn(async move {
                let submission = group_interface.submit_ticket(chain_ticket).await;
                let _ = returned_tx.send(());
                match submission.wait().await {
                    Ok(submitted) => {
                        debug!(
                            virtual_staker_index,
                            block = submitted.block_number,
                            "Ticket submitted"
                        );
                    }
                    Err(e) => {
                        if let Err(TrySendError::Full(e)) = err_sink.try_send(e) {
                            debug!(error = %e, "Submission error sink is full, dropping error");
                        }
                    }
                }
            });
            report.dispatched += 1;

            tokio::select! {
                biased;

                _ = cancelled(&mut cancel) => {
                    state = SubmissionState::Cancelled;
                    break;
                }

                // A worker that panicked mid-call also closes the channel.
                _ = returned_rx => {}
            }
        }

        if state == SubmissionState::Dispatching {
            state = SubmissionState::Draining;
            loop {
                tokio::select! {
                    biased;

                    _ = cancelled(&mut cancel) => {
                        state = SubmissionState::Cancelled;
                        break;
                    }

                    joined = workers.join_next() => match joined {
                        Some(Ok(())) => {}
                        Some(Err(e)) => warn!(error = %e, "Ticket submission worker failed"),
                        None => break,
                    },
                }
            }
        }

        report.cancelled = state == SubmissionState::Cancelled;
        if report.cancelled {
            debug!(
                outstanding = workers.len(),
                "Ticket submission cancelled, detaching outstanding workers"
            );
            workers.detach_all();
        }

        state = SubmissionState::Done;
        info!(
            dispatched = report.dispatched,
            skipped = report.skipped,
            cancelled = report.cancelled,
            ?state,
            "Ticket submission finished"
        );
        report
    }
}

/// Resolves once `cancel` reads `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Subscription;
    use crate::error::BeaconError;
    use crate::events::{GroupSelectionStartSender, GroupTicketSubmission, submission_error_channel};
    use crate::utils::async_result::AsyncResult;
    use async_trait::async_trait;
    use beacon_sdk::config::ChainConfig;
    use beacon_sdk::objects::{ChainTicket, StakerAddress};
    use num_bigint::BigUint;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    type SubmitFn = dyn Fn(usize, &ChainTicket) -> AsyncResult<GroupTicketSubmission> + Send + Sync;

    /// Group interface recording every submitted ticket, in call order.
    struct MockGroupInterface {
        submitted: StdMutex<Vec<ChainTicket>>,
        latency: Duration,
        submit: Box<SubmitFn>,
    }

    impl MockGroupInterface {
        fn new(
            latency: Duration,
            submit: impl Fn(usize, &ChainTicket) -> AsyncResult<GroupTicketSubmission>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                submitted: StdMutex::new(Vec::new()),
                latency,
                submit: Box::new(submit),
            })
        }

        fn fulfilling() -> Arc<Self> {
            Self::new(Duration::ZERO, |_, ticket| {
                AsyncResult::fulfilled(GroupTicketSubmission {
                    ticket_value: ticket.value.clone(),
                    block_number: 111,
                })
            })
        }

        fn submitted(&self) -> Vec<ChainTicket> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GroupInterface for MockGroupInterface {
        async fn submit_ticket(&self, ticket: ChainTicket) -> AsyncResult<GroupTicketSubmission> {
            let index = {
                let mut submitted = self.submitted.lock().unwrap();
                submitted.push(ticket.clone());
                submitted.len() - 1
            };
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            (self.submit)(index, &ticket)
        }

        async fn get_selected_participants(&self) -> Result<Vec<StakerAddress>, BeaconError> {
            unimplemented!("not used by ticket submission")
        }

        async fn on_group_selection_started(
            &self,
            _: GroupSelectionStartSender,
        ) -> Result<Subscription, BeaconError> {
            unimplemented!("not used by ticket submission")
        }
    }

    /// 2^257 is bigger than any SHA-256 value, so every ticket is admitted.
    fn accept_all_threshold() -> BigUint {
        BigUint::from(1u32) << 257u32
    }

    fn node_with_threshold(natural_threshold: BigUint) -> Node {
        Node::new(
            StakerAddress::new([1u8; 20]),
            BigUint::from(10_000u32),
            ChainConfig {
                group_size: 3,
                honest_threshold: 2,
                natural_threshold,
                min_stake: BigUint::from(1_000u32),
                min_group_selection_duration_blocks: 10,
                ticket_submission_timeout_blocks: 6,
            },
        )
    }

    fn tickets(count: u64) -> Vec<Ticket> {
        let beacon_output = BigUint::from(10u32).to_bytes_be();
        (1..=count)
            .map(|index| Ticket::new(&beacon_output, b"StakerValue1001", index).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_submit_all_tickets() {
        let node = node_with_threshold(accept_all_threshold());
        let tickets = tickets(4);
        let group = MockGroupInterface::fulfilling();
        let (err_tx, mut err_rx) = submission_error_channel(tickets.len());
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let report = node.submit_tickets(&tickets, group.clone(), cancel_rx, err_tx).await;

        assert_eq!(
            report,
            SubmissionReport {
                dispatched: 4,
                skipped: 0,
                cancelled: false
            }
        );

        let submitted = group.submitted();
        assert_eq!(submitted.len(), tickets.len());
        for (ticket, chain_ticket) in tickets.iter().zip(&submitted) {
            assert_eq!(&Ticket::from_chain_ticket(chain_ticket).unwrap(), ticket);
        }
        assert!(err_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_ticket_submission_after_a_timeout() {
        let node = node_with_threshold(accept_all_threshold());
        let tickets = tickets(6);
        let group = MockGroupInterface::new(Duration::from_millis(500), |_, ticket| {
            AsyncResult::fulfilled(GroupTicketSubmission {
                ticket_value: ticket.value.clone(),
                block_number: 222,
            })
        });
        let (err_tx, _err_rx) = submission_error_channel(tickets.len());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let cancelled_at = Arc::new(StdMutex::new(None));
        {
            let cancelled_at = cancelled_at.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                *cancelled_at.lock().unwrap() = Some(Instant::now());
                cancel_tx.send(true).unwrap();
                // Cancelling twice is a no-op.
                let _ = cancel_tx.send(true);
            });
        }

        let report = node.submit_tickets(&tickets, group.clone(), cancel_rx, err_tx).await;
        let returned_at = Instant::now();

        let submitted = group.submitted().len();
        assert!(submitted > 0, "no tickets submitted");
        assert!(submitted < tickets.len(), "ticket submission has not been cancelled");
        assert!(report.cancelled);
        assert!(report.dispatched < tickets.len());

        let cancelled_at = cancelled_at.lock().unwrap().unwrap();
        assert!(returned_at.duration_since(cancelled_at) < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_failed_submissions_do_not_halt_others() {
        let node = node_with_threshold(accept_all_threshold());
        let tickets = tickets(4);
        let group = MockGroupInterface::new(Duration::ZERO, |index, ticket| {
            if index % 2 == 0 {
                AsyncResult::failed(BeaconError::SubmissionRejected(format!("ticket {index}")))
            } else {
                AsyncResult::fulfilled(GroupTicketSubmission {
                    ticket_value: ticket.value.clone(),
                    block_number: 1,
                })
            }
        });
        let (err_tx, mut err_rx) = submission_error_channel(tickets.len());
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let report = node.submit_tickets(&tickets, group.clone(), cancel_rx, err_tx).await;

        assert_eq!(report.dispatched, 4);
        assert_eq!(group.submitted().len(), 4);

        let mut errors = Vec::new();
        while let Ok(e) = err_rx.try_recv() {
            errors.push(e);
        }
        errors.sort_by_key(|e| e.to_string());
        assert_eq!(
            errors,
            vec![
                BeaconError::SubmissionRejected("ticket 0".to_string()),
                BeaconError::SubmissionRejected("ticket 2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_error_sink_drops_errors() {
        let node = node_with_threshold(accept_all_threshold());
        let tickets = tickets(3);
        let group = MockGroupInterface::new(Duration::ZERO, |_, _| {
            AsyncResult::failed(BeaconError::ChainUnavailable("offline".to_string()))
        });
        let (err_tx, mut err_rx) = submission_error_channel(1);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let report = node.submit_tickets(&tickets, group.clone(), cancel_rx, err_tx).await;

        assert_eq!(report.dispatched, 3);
        assert!(err_rx.try_recv().is_ok());
        assert!(err_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tickets_at_or_above_threshold_are_skipped() {
        let mut tickets = tickets(5);
        tickets.sort_by(|a, b| a.value.cmp(&b.value));
        // Only the two lowest tickets are strictly below the third one's value.
        let node = node_with_threshold(tickets[2].value.to_big_uint());
        let group = MockGroupInterface::fulfilling();
        let (err_tx, _err_rx) = submission_error_channel(tickets.len());
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let report = node.submit_tickets(&tickets, group.clone(), cancel_rx, err_tx).await;

        assert_eq!(report.dispatched, 2);
        assert_eq!(report.skipped, 3);
        let submitted: Vec<BigUint> = group.submitted().into_iter().map(|t| t.value).collect();
        assert_eq!(
            submitted,
            vec![tickets[0].value.to_big_uint(), tickets[1].value.to_big_uint()]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_submits_nothing() {
        let node = node_with_threshold(accept_all_threshold());
        let group = MockGroupInterface::fulfilling();
        let (err_tx, _err_rx) = submission_error_channel(4);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_tx.send(true).unwrap();

        let report = node.submit_tickets(&tickets(4), group.clone(), cancel_rx, err_tx).await;

        assert!(report.cancelled);
        assert_eq!(report.dispatched, 0);
        assert!(group.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_draining_waits_for_pending_results() {
        let node = node_with_threshold(accept_all_threshold());
        let pending: Arc<StdMutex<Vec<AsyncResult<GroupTicketSubmission>>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let group = {
            let pending = pending.clone();
            MockGroupInterface::new(Duration::ZERO, move |_, _| {
                let result = AsyncResult::new();
                pending.lock().unwrap().push(result.clone());
                result
            })
        };
        {
            let pending = pending.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                for result in pending.lock().unwrap().iter() {
                    result
                        .fulfill(GroupTicketSubmission {
                            ticket_value: BigUint::from(1u32),
                            block_number: 5,
                        })
                        .unwrap();
                }
            });
        }
        let (err_tx, _err_rx) = submission_error_channel(3);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let report = node.submit_tickets(&tickets(3), group.clone(), cancel_rx, err_tx).await;

        assert!(!report.cancelled);
        assert!(pending.lock().unwrap().iter().all(|r| r.is_settled()));
    }

    #[tokio::test]
    async fn test_cancel_detaches_outstanding_workers() {
        let node = node_with_threshold(accept_all_threshold());
        let pending: Arc<StdMutex<Vec<AsyncResult<GroupTicketSubmission>>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let group = {
            let pending = pending.clone();
            MockGroupInterface::new(Duration::ZERO, move |_, _| {
                let result = AsyncResult::new();
                pending.lock().unwrap().push(result.clone());
                result
            })
        };
        let (err_tx, mut err_rx) = submission_error_channel(3);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = cancel_tx.send(true);
        });

        let report = node.submit_tickets(&tickets(3), group.clone(), cancel_rx, err_tx).await;
        assert!(report.cancelled);
        assert_eq!(report.dispatched, 3);

        // The abandoned worker is still alive and reports the late failure.
        pending.lock().unwrap()[1]
            .fail(BeaconError::SubmissionRejected("late".to_string()))
            .unwrap();
        let error = tokio::time::timeout(Duration::from_secs(1), err_rx.recv())
            .await
            .unwrap();
        assert_eq!(error, Some(BeaconError::SubmissionRejected("late".to_string())));
    }

    #[tokio::test]
    async fn test_cancel_keeps_in_flight_submission_reporting() {
        let node = node_with_threshold(accept_all_threshold());
        let group = MockGroupInterface::new(Duration::from_millis(300), |_, _| {
            AsyncResult::failed(BeaconError::SubmissionRejected("rejected".to_string()))
        });
        let (err_tx, mut err_rx) = submission_error_channel(4);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        let started = Instant::now();
        let report = node.submit_tickets(&tickets(4), group.clone(), cancel_rx, err_tx).await;

        assert!(report.cancelled);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(report.dispatched, 1);
        assert_eq!(group.submitted().len(), 1);

        // The call that was in flight at cancel time still reports its outcome.
        let error = tokio::time::timeout(Duration::from_secs(1), err_rx.recv())
            .await
            .unwrap();
        assert_eq!(error, Some(BeaconError::SubmissionRejected("rejected".to_string())));
    }
}
