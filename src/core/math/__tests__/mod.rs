pub mod combinatorics_test;
