pub mod aggregator;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod instance_worker;
pub mod metrics;
pub mod model;
pub mod pod_client;
pub mod pod_worker;
pub mod registry;
pub mod repository;
pub mod topk;
