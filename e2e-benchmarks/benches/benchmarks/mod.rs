pub mod joinbench;
