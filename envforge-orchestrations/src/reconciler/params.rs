//! Workload-membership sets stored as comma-joined stack parameters

/// Direction of a membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOp {
    Add,
    Remove,
}

/// Parse a comma-joined value into an ordered set without blanks or duplicates.
pub fn parse_members(value: &str) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        if !members.iter().any(|m| m == name) {
            members.push(name.to_string());
        }
    }
    members
}

/// New parameter value after adding or removing `workload`.
pub fn recompute(current: &str, workload: &str, op: MembershipOp) -> String {
    let mut members = parse_members(current);
    match op {
        MembershipOp::Add => {
            if !members.iter().any(|m| m == workload) {
                members.push(workload.to_string());
            }
        }
        MembershipOp::Remove => members.retain(|m| m != workload),
    }
    members.join(",")
}

/// True when both values hold the same members, ignoring order.
pub fn same_members(a: &str, b: &str) -> bool {
    let mut a = parse_members(a);
    let mut b = parse_members(b);
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_appends_once() {
        assert_eq!(recompute("", "api", MembershipOp::Add), "api");
        assert_eq!(recompute("web", "api", MembershipOp::Add), "web,api");
        assert_eq!(recompute("web,api", "api", MembershipOp::Add), "web,api");
    }

    #[test]
    fn test_remove_drops_exactly_one_name() {
        assert_eq!(recompute("my-app,my-other-app", "my-app", MembershipOp::Remove), "my-other-app");
        assert_eq!(recompute("my-app", "my-app", MembershipOp::Remove), "");
        assert_eq!(recompute("web", "api", MembershipOp::Remove), "web");
    }

    #[test]
    fn test_existing_duplicates_and_blanks_are_collapsed() {
        assert_eq!(recompute("web, ,web,api,", "db", MembershipOp::Add), "web,api,db");
        assert_eq!(recompute("api,api", "api", MembershipOp::Remove), "");
    }

    #[test]
    fn test_membership_reflects_net_effect_of_a_sequence() {
        let ops = [
            MembershipOp::Add,
            MembershipOp::Add,
            MembershipOp::Remove,
            MembershipOp::Add,
            MembershipOp::Remove,
            MembershipOp::Remove,
            MembershipOp::Add,
        ];
        let mut value = "other".to_string();
        for op in ops {
            value = recompute(&value, "api", op);
            let members = parse_members(&value);
            let unique: std::collections::HashSet<&String> = members.iter().collect();
            assert_eq!(unique.len(), members.len());
            assert_eq!(members.iter().filter(|m| *m == "api").count(), usize::from(op == MembershipOp::Add));
            assert!(members.contains(&"other".to_string()));
        }
    }

    #[test]
    fn test_same_members_ignores_order_and_spacing() {
        assert!(same_members("a,b", "b, a"));
        assert!(!same_members("a,b", "a"));
    }
}
