mod helpers;

mod node_tests;
mod tablet_tests;
