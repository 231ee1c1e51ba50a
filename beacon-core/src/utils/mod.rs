pub mod async_result;
