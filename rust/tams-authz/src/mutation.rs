use crate::{AuthClasses, Caller, Capability, Resource, TamsAuthzError};

/// Check that `caller` may replace the auth classes of `resource` with
/// `proposed`.
///
/// Write on the resource is always required. Adding or removing a class that
/// grants read additionally requires Read, and adding or removing a class
/// that grants delete requires Delete, so a caller can never hand out (or
/// take away) a capability they do not hold.
pub fn validate_mutation(
    resource: &Resource,
    proposed: &AuthClasses,
    caller: &Caller,
) -> Result<(), TamsAuthzError> {
    resource.decide(caller, Capability::Write, true)?;

    let changed = proposed.symmetric_difference(resource.auth_classes());
    let classifier = caller.classifier();

    tracing::debug!(
        kind = %resource.kind(),
        id = %resource.id(),
        changed = %changed.to_csv(),
        "Validating auth class change"
    );

    if classifier.any_has(&changed, Capability::Read) {
        resource.decide(caller, Capability::Read, true)?;
    }

    if classifier.any_has(&changed, Capability::Delete) {
        resource.decide(caller, Capability::Delete, true)?;
    }

    Ok(())
}
