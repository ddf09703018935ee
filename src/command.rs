//! Operator command surface.
//!
//! One textual command per line; the serial line discipline itself is
//! external, this module only maps the command word to an operation and
//! renders the typed response. Responses carry plain data snapshots so a
//! console, a test or a log sink can format them as it likes; `Display`
//! gives the canonical one-command-one-report text.

use core::fmt;

use crate::drain::DrainOutcome;
use crate::route::RoutesSnapshot;
use crate::sensor::SensorReadError;
use crate::{NEIGHBOR_TABLE_SIZE, NodeAddr, PACKET_QUEUE_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the route table.
    Routes,
    /// Trigger route discovery toward the sink.
    Discover,
    /// Drain one queue cycle immediately.
    Send,
    /// Sample the sensor and enqueue the reading.
    Sense,
    /// Print queue contents.
    Queue,
    /// Print the cumulative energy-event counter.
    Battery,
    /// Print the neighbor table.
    Neighbors,
}

impl Command {
    /// Parses one line of operator input. Unknown words yield `None`.
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim() {
            "routes" => Some(Command::Routes),
            "discover" => Some(Command::Discover),
            "send" => Some(Command::Send),
            "sense" => Some(Command::Sense),
            "queue" => Some(Command::Queue),
            "battery" => Some(Command::Battery),
            "neighbors" => Some(Command::Neighbors),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueEntrySummary {
    pub origin: NodeAddr,
    pub destination: NodeAddr,
    pub hop_count: u8,
    pub length: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborSummary {
    pub addr: NodeAddr,
    pub hops_to_sink: u8,
    pub battery_level: u8,
    /// Seconds since discovery last heard this neighbor.
    pub heard_secs_ago: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenseOutcome {
    /// Reading sampled and queued for delivery.
    Enqueued,
    /// Sampling failed; nothing was enqueued.
    SensorFailed(SensorReadError),
    /// Queue at capacity; the new reading was discarded.
    QueueFull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandResponse {
    Routes(RoutesSnapshot),
    DiscoverStarted { target: NodeAddr },
    Drain(DrainOutcome),
    Sense(SenseOutcome),
    Queue {
        len: usize,
        capacity: usize,
        entries: [Option<QueueEntrySummary>; PACKET_QUEUE_SIZE],
    },
    Battery { energy_events: u32 },
    Neighbors {
        entries: [Option<NeighborSummary>; NEIGHBOR_TABLE_SIZE],
    },
}

impl fmt::Display for CommandResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResponse::Routes(entries) => {
                writeln!(f, "routes:")?;
                let mut any = false;
                for entry in entries.iter().flatten() {
                    any = true;
                    writeln!(f, "  {} via {} cost {}", entry.destination, entry.next_hop, entry.cost)?;
                }
                if !any {
                    writeln!(f, "  (none)")?;
                }
                Ok(())
            }
            CommandResponse::DiscoverStarted { target } => {
                writeln!(f, "route discovery started toward {}", target)
            }
            CommandResponse::Drain(outcome) => match outcome {
                DrainOutcome::Empty => writeln!(f, "queue empty, nothing to send"),
                DrainOutcome::Sent(next_hop) => writeln!(f, "packet sent via {}", next_hop),
                DrainOutcome::NoRoute => writeln!(f, "no route, packet left queued"),
                DrainOutcome::LinkFailed(next_hop) => {
                    writeln!(f, "link send to {} failed, packet left queued", next_hop)
                }
                DrainOutcome::NoPolicy => writeln!(f, "no forward policy registered"),
                DrainOutcome::Dropped => writeln!(f, "retry budget exhausted, packet dropped"),
            },
            CommandResponse::Sense(outcome) => match outcome {
                SenseOutcome::Enqueued => writeln!(f, "reading enqueued"),
                SenseOutcome::SensorFailed(SensorReadError::NotReady) => {
                    writeln!(f, "sensor not ready, nothing enqueued")
                }
                SenseOutcome::SensorFailed(SensorReadError::Hardware) => {
                    writeln!(f, "sensor fault, nothing enqueued")
                }
                SenseOutcome::QueueFull => writeln!(f, "queue full, reading dropped"),
            },
            CommandResponse::Queue { len, capacity, entries } => {
                writeln!(f, "queue: {}/{}", len, capacity)?;
                for (i, entry) in entries.iter().flatten().enumerate() {
                    writeln!(
                        f,
                        "  [{}] origin {} dest {} hops {} len {}",
                        i, entry.origin, entry.destination, entry.hop_count, entry.length
                    )?;
                }
                Ok(())
            }
            CommandResponse::Battery { energy_events } => {
                writeln!(f, "battery: {} energy events", energy_events)
            }
            CommandResponse::Neighbors { entries } => {
                writeln!(f, "neighbors:")?;
                let mut any = false;
                for entry in entries.iter().flatten() {
                    any = true;
                    writeln!(
                        f,
                        "  {} hops {} battery {} heard {}s ago",
                        entry.addr, entry.hops_to_sink, entry.battery_level, entry.heard_secs_ago
                    )?;
                }
                if !any {
                    writeln!(f, "  (none)")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn every_operator_word_parses() {
        assert_eq!(Command::parse("routes"), Some(Command::Routes));
        assert_eq!(Command::parse("discover"), Some(Command::Discover));
        assert_eq!(Command::parse("send"), Some(Command::Send));
        assert_eq!(Command::parse("sense"), Some(Command::Sense));
        assert_eq!(Command::parse("queue"), Some(Command::Queue));
        assert_eq!(Command::parse("battery"), Some(Command::Battery));
        assert_eq!(Command::parse(" neighbors\n"), Some(Command::Neighbors));
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert_eq!(Command::parse("reboot"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn battery_report_renders() {
        let text = format!("{}", CommandResponse::Battery { energy_events: 42 });
        assert_eq!(text, "battery: 42 energy events\n");
    }

    #[test]
    fn empty_tables_render_placeholders() {
        let routes = format!("{}", CommandResponse::Routes([None; crate::ROUTE_TABLE_SIZE]));
        assert!(routes.contains("(none)"));

        let neighbors = format!(
            "{}",
            CommandResponse::Neighbors {
                entries: [None; NEIGHBOR_TABLE_SIZE]
            }
        );
        assert!(neighbors.contains("(none)"));
    }

    #[test]
    fn queue_report_lists_entries_in_order() {
        let mut entries = [None; PACKET_QUEUE_SIZE];
        entries[0] = Some(QueueEntrySummary {
            origin: 3,
            destination: 1,
            hop_count: 0,
            length: 8,
        });
        let text = format!(
            "{}",
            CommandResponse::Queue {
                len: 1,
                capacity: PACKET_QUEUE_SIZE,
                entries
            }
        );
        assert!(text.starts_with("queue: 1/10\n"));
        assert!(text.contains("[0] origin 3 dest 1 hops 0 len 8"));
    }
}
