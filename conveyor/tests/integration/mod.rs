mod pipeline_test;
mod resilience_test;
