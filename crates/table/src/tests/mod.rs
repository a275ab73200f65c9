mod helpers;

mod family_tests;
mod scan_tests;
