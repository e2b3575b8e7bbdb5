use serde::Serialize;

/// Worker lifecycle. Only an `Active` worker intercepts fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  /// Constructed, nothing installed yet
  #[default]
  Parsed,
  Installing,
  /// Installed and waiting for activation
  Installed,
  Activating,
  Active,
  /// Installation failed or superseded
  Redundant,
}

impl WorkerState {
  pub fn can_transition_to(self, next: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
      (self, next),
      (Parsed, Installing)
        | (Redundant, Installing)
        | (Installing, Installed)
        | (Installing, Redundant)
        | (Installed, Activating)
        | (Activating, Active)
        | (Activating, Redundant)
        | (Active, Redundant)
    )
  }

  pub fn intercepts_fetches(self) -> bool {
    self == WorkerState::Active
  }
}
