// Dispute resolution: counter-notes whose own consensus has settled either
// retract the disputed note's label (approved) or are closed (rejected).

pub mod resolver;
