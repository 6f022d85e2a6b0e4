//! Deterministic TCP/UDP port-range partitioning.
//!
//! Each container gets a contiguous TCP range and a parallel UDP range whose
//! lengths equal its declared port count. Ranges are carved out in
//! declaration order, so re-ordering the specification reshuffles every
//! container's ports; callers relying on stable ranges must keep the
//! specification order stable.

use serde::{Deserialize, Serialize};

use crate::ordered_map::OrderedMap;

/// First TCP port handed out
pub const DEFAULT_TCP_START: u16 = 9000;

/// First UDP port handed out
pub const DEFAULT_UDP_START: u16 = 10000;

/// An inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Number of ports in the range
    pub fn len(&self) -> u16 {
        self.end - self.start + 1
    }
}

/// The TCP and UDP ranges reserved for one container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment {
    pub tcp: PortRange,
    pub udp: PortRange,
}

/// Container name -> port assignment, in declaration order
pub type PortPlan = OrderedMap<PortAssignment>;

/// Errors from port-range partitioning
#[derive(Debug, thiserror::Error)]
pub enum PortPlanError {
    #[error("container '{container}': each host must be assigned 1 or more ports (got {count})")]
    InvalidPortCount { container: String, count: u16 },

    #[error("container '{container}': port range would run past 65535")]
    PortSpaceExhausted { container: String },
}

/// Partition contiguous TCP and UDP ranges across containers in declaration
/// order, starting at `tcp_start` and `udp_start`.
pub fn plan_ports<'a, I>(
    containers_in_order: I,
    tcp_start: u16,
    udp_start: u16,
) -> Result<PortPlan, PortPlanError>
where
    I: IntoIterator<Item = (&'a str, u16)>,
{
    let mut plan = PortPlan::new();
    let mut tcp_cursor = u32::from(tcp_start);
    let mut udp_cursor = u32::from(udp_start);

    for (name, count) in containers_in_order {
        if count == 0 {
            return Err(PortPlanError::InvalidPortCount {
                container: name.to_string(),
                count,
            });
        }
        let tcp_end = tcp_cursor + u32::from(count) - 1;
        let udp_end = udp_cursor + u32::from(count) - 1;
        if tcp_end > u32::from(u16::MAX) || udp_end > u32::from(u16::MAX) {
            return Err(PortPlanError::PortSpaceExhausted {
                container: name.to_string(),
            });
        }

        plan.insert(
            name,
            PortAssignment {
                tcp: PortRange {
                    start: tcp_cursor as u16,
                    end: tcp_end as u16,
                },
                udp: PortRange {
                    start: udp_cursor as u16,
                    end: udp_end as u16,
                },
            },
        );
        tcp_cursor = tcp_end + 1;
        udp_cursor = udp_end + 1;
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_follow_declaration_order() {
        let plan = plan_ports(
            [("a", 1), ("b", 2), ("c", 1)],
            DEFAULT_TCP_START,
            DEFAULT_UDP_START,
        )
        .unwrap();

        let a = plan.get("a").unwrap();
        assert_eq!((a.tcp.start, a.tcp.end), (9000, 9000));
        assert_eq!((a.udp.start, a.udp.end), (10000, 10000));

        let b = plan.get("b").unwrap();
        assert_eq!((b.tcp.start, b.tcp.end), (9001, 9002));
        assert_eq!((b.udp.start, b.udp.end), (10001, 10002));

        let c = plan.get("c").unwrap();
        assert_eq!((c.tcp.start, c.tcp.end), (9003, 9003));
        assert_eq!((c.udp.start, c.udp.end), (10003, 10003));
    }

    #[test]
    fn test_total_advance_equals_sum_of_counts() {
        let counts = [("a", 3u16), ("b", 1), ("c", 7), ("d", 2)];
        let total: u16 = counts.iter().map(|(_, c)| c).sum();
        let plan = plan_ports(counts, DEFAULT_TCP_START, DEFAULT_UDP_START).unwrap();

        let last = plan.get("d").unwrap();
        assert_eq!(last.tcp.end + 1 - DEFAULT_TCP_START, total);
        assert_eq!(last.udp.end + 1 - DEFAULT_UDP_START, total);

        let assigned: u16 = plan.iter().map(|(_, a)| a.tcp.len()).sum();
        assert_eq!(assigned, total);
    }

    #[test]
    fn test_ranges_never_overlap() {
        let plan = plan_ports(
            [("a", 5), ("b", 5), ("c", 5)],
            DEFAULT_TCP_START,
            DEFAULT_UDP_START,
        )
        .unwrap();

        let assignments: Vec<&PortAssignment> = plan.iter().map(|(_, a)| a).collect();
        for pair in assignments.windows(2) {
            assert!(pair[0].tcp.end < pair[1].tcp.start);
            assert!(pair[0].udp.end < pair[1].udp.start);
        }
    }

    #[test]
    fn test_planning_is_idempotent() {
        let first = plan_ports([("x", 2), ("y", 4)], 9000, 10000).unwrap();
        let second = plan_ports([("x", 2), ("y", 4)], 9000, 10000).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reordering_reshuffles_ranges() {
        let forward = plan_ports([("a", 2), ("b", 3)], 9000, 10000).unwrap();
        let reversed = plan_ports([("b", 3), ("a", 2)], 9000, 10000).unwrap();
        assert_ne!(forward.get("a"), reversed.get("a"));
        assert_ne!(forward.get("b"), reversed.get("b"));
    }

    #[test]
    fn test_zero_port_count_names_the_offender() {
        let error = plan_ports([("ok", 1), ("broken", 0)], 9000, 10000).unwrap_err();
        match error {
            PortPlanError::InvalidPortCount { container, count } => {
                assert_eq!(container, "broken");
                assert_eq!(count, 0);
            }
            other => panic!("expected InvalidPortCount, got {:?}", other),
        }
    }

    #[test]
    fn test_port_space_exhaustion_names_the_offender() {
        let error = plan_ports([("big", 600)], 65000, 10000).unwrap_err();
        assert!(matches!(
            error,
            PortPlanError::PortSpaceExhausted { container } if container == "big"
        ));
    }
}
