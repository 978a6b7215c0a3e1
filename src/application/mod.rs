mod balancer_service;

pub use balancer_service::{BalancerService, Dispatch};
