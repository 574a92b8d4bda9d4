pub mod mocks;

mod backfill_tests;
mod stream_tests;
mod subscription_tests;
