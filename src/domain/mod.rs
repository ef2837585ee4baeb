// Domain layer: core models, registry rules and ports (interfaces).

pub mod model;
pub mod ports;
pub mod registry;
