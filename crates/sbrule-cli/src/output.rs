use sbrule_resource::Report;
use sbrule_store::{LifecycleEvent, ResourceData};

const MASK: &str = "(sensitive)";

/// Render an engine report as human-readable text.
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    if report.changes.is_empty() {
        out.push_str("No changes.\n");
    }
    for change in &report.changes {
        out.push_str(&change.to_string());
        out.push('\n');
    }
    if !report.changes.is_empty() {
        out.push_str(&format!(
            "{} change(s){}.\n",
            report.changes.len(),
            if report.dry_run { " planned" } else { " applied" }
        ));
    }
    if !report.errors.is_empty() {
        out.push_str(&format!("\n{} error(s):\n", report.errors.len()));
        for e in &report.errors {
            out.push_str(&format!("  ! {e}\n"));
        }
    }
    out
}

/// Replace every non-empty secret with a placeholder.
pub fn masked(mut data: ResourceData) -> ResourceData {
    if let Some(observed) = data.observed.as_mut() {
        for slot in [
            &mut observed.primary_key,
            &mut observed.secondary_key,
            &mut observed.primary_connection_string,
            &mut observed.secondary_connection_string,
            &mut observed.primary_connection_string_alias,
            &mut observed.secondary_connection_string_alias,
        ] {
            if !slot.is_empty() {
                *slot = MASK.to_string();
            }
        }
    }
    data
}

pub fn render_resource(data: &ResourceData) -> String {
    let c = &data.config;
    let mut out = format!("{}:\n", data.address);
    out.push_str(&format!("  id                  = {}\n", data.id.as_deref().unwrap_or("(absent)")));
    out.push_str(&format!("  name                = {}\n", c.name));
    out.push_str(&format!("  namespace_name      = {}\n", c.namespace_name));
    out.push_str(&format!("  queue_name          = {}\n", c.queue_name));
    out.push_str(&format!("  resource_group_name = {}\n", c.resource_group_name));
    out.push_str(&format!("  listen              = {}\n", c.rights.listen));
    out.push_str(&format!("  send                = {}\n", c.rights.send));
    out.push_str(&format!("  manage              = {}\n", c.rights.manage));
    if let Some(observed) = &data.observed {
        for (name, value) in observed.secrets() {
            out.push_str(&format!("  {name:<33} = {value}\n"));
        }
    }
    if let Some(at) = data.last_refreshed_at {
        out.push_str(&format!("  last refreshed {}\n", at.to_rfc3339()));
    }
    out.push('\n');
    out
}

pub fn render_event(event: &LifecycleEvent) -> String {
    let (kind, at) = match event {
        LifecycleEvent::Created { at, .. } => ("created", at),
        LifecycleEvent::Updated { at, .. } => ("updated", at),
        LifecycleEvent::Deleted { at, .. } => ("deleted", at),
        LifecycleEvent::Imported { at, .. } => ("imported", at),
        LifecycleEvent::Vanished { at, .. } => ("vanished", at),
    };
    format!("{} {:<8} {} {}", at.to_rfc3339(), kind, event.address(), event.resource_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbrule_domain::{AccessRights, DesiredConfiguration, ObservedState};
    use sbrule_resource::Change;

    fn tracked() -> ResourceData {
        let mut data = ResourceData::new(
            "orders",
            DesiredConfiguration {
                name: "rule1".into(),
                namespace_name: "acme-orders".into(),
                queue_name: "q1".into(),
                resource_group_name: "rg1".into(),
                rights: AccessRights::new(true, false, false),
            },
        );
        data.id = Some("/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.ServiceBus/namespaces/acme-orders/queues/q1/authorizationRules/rule1".into());
        data.observed = Some(ObservedState {
            rights: AccessRights::new(true, false, false),
            primary_key: "c2VjcmV0".into(),
            primary_connection_string: "Endpoint=sb://acme-orders.servicebus.windows.net/;SharedAccessKey=c2VjcmV0".into(),
            ..ObservedState::default()
        });
        data
    }

    #[test]
    fn masking_hides_secrets_but_keeps_empty_slots() {
        let data = masked(tracked());
        let observed = data.observed.unwrap();
        assert_eq!(observed.primary_key, MASK);
        assert_eq!(observed.primary_connection_string, MASK);
        assert_eq!(observed.secondary_key, "");

        let text = render_resource(&masked(tracked()));
        assert!(!text.contains("c2VjcmV0"), "got: {text}");
    }

    #[test]
    fn report_lists_changes_and_errors() {
        let mut report = Report::new(true);
        assert_eq!(render_report(&report), "No changes.\n");

        report.changes.push(Change::Created { address: "orders".into(), id: "/x".into() });
        report.errors.push("billing: creating/updating /y: request failed".into());
        let text = render_report(&report);
        assert!(text.contains("+ orders: create /x"), "got: {text}");
        assert!(text.contains("1 change(s) planned."), "got: {text}");
        assert!(text.contains("  ! billing: creating/updating /y"), "got: {text}");
    }
}
