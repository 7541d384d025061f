mod database_tests;
mod support;
