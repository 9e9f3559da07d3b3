mod sheets_tests;
