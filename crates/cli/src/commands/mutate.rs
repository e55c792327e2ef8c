use rideshare_engine::{
    AdminCommand, AdminFacade, AdminRequest, DriverRequest, TransitionEngine,
};
use rideshare_storage::RideStorage;

use super::{print_json, CommandError};
use crate::AdminOp;

pub(super) async fn drive<S: RideStorage>(
    engine: &TransitionEngine<S>,
    request: DriverRequest,
) -> Result<(), CommandError> {
    let outcome = engine.driver_action(request).await?;
    print_json(&outcome)
}

pub(super) async fn admin<S: RideStorage>(
    facade: &AdminFacade<S>,
    request: AdminRequest,
    op: AdminOp,
) -> Result<(), CommandError> {
    let command = match op {
        AdminOp::Cancel => AdminCommand::Cancel,
        AdminOp::Reassign { driver_id } => AdminCommand::ReassignDriver {
            new_driver_id: driver_id,
        },
        AdminOp::ForceComplete => AdminCommand::ForceComplete,
        AdminOp::CorrectStatus { status } => AdminCommand::CorrectStatus { new_status: status },
    };
    let outcome = facade.execute(request, command).await?;
    print_json(&outcome)
}
