pub mod estimates;
