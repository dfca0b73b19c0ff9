mod run_test;
