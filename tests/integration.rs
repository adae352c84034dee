use std::{cell::RefCell, rc::Rc, str::from_utf8};

use wallet_ledger::{
    ErrorKind, InMemoryStore, LedgerEngine, SqliteStore,
    bin_utils::{Report, Service},
};

const TEST_FILE: &str = include_str!("commands.csv");

fn run(report: Report) -> (String, Vec<ErrorKind>) {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let mut output = Vec::new();
    let service = Service {
        input: TEST_FILE.as_bytes(),
        output: &mut output,
        engine: LedgerEngine::new(InMemoryStore::new()),
        report,
        error_printer: Box::new({
            let errors = errors.clone();
            move |_line, err| errors.borrow_mut().push(err.kind())
        }),
    };
    service.run().unwrap();
    let output = from_utf8(&output).unwrap().to_string();
    let errors = errors.borrow().clone();
    (output, errors)
}

#[test]
fn process_commands() {
    let (output, errors) = run(Report::Balances);
    assert_eq!(output, "user,balance\nalice,50.00\nbob,20.00\ncarol,0\n");
    assert_eq!(
        errors,
        vec![
            ErrorKind::InsufficientFunds,
            ErrorKind::InvalidAmount,
            ErrorKind::AlreadyExists,
            ErrorKind::SameWallet,
            ErrorKind::NotFound,
            ErrorKind::InvalidInput,
        ]
    );
}

#[test]
fn print_history() {
    let (output, _) = run(Report::History {
        user_id: "alice".to_string(),
    });
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "id,type,amount,balance,description,createdAt");
    assert!(lines[1].starts_with("3,TRANSFER,-20.00,50.00,Transfer to bob: rent,"));
    assert!(lines[2].starts_with("2,WITHDRAWAL,30.00,70.00,,"));
    assert!(lines[3].starts_with("1,DEPOSIT,100.00,100.00,Initial deposit,"));
}

#[test]
fn malformed_input_aborts() {
    let mut output = Vec::new();
    let service = Service {
        input: "command,user,counterparty,amount,description\nrefund,alice,,1,\n".as_bytes(),
        output: &mut output,
        engine: LedgerEngine::new(InMemoryStore::new()),
        report: Report::Balances,
        error_printer: Box::new(|_, _| {}),
    };
    let err = service.run().unwrap_err();
    assert!(err.to_string().starts_with("Malformed row at line"));
    assert!(output.is_empty());
}

#[test]
fn balances_list_only_wallets_the_batch_touched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let batch = |input: &str| {
        let mut output = Vec::new();
        let service = Service {
            input: input.as_bytes(),
            output: &mut output,
            engine: LedgerEngine::new(SqliteStore::open(&path).unwrap()),
            report: Report::Balances,
            error_printer: Box::new(|_, _| {}),
        };
        service.run().unwrap();
        from_utf8(&output).unwrap().to_string()
    };

    let first = batch(
        "command,user,counterparty,amount,description\n\
         create,alice,,,\n\
         create,bob,,,\n\
         deposit,bob,,7,\n",
    );
    assert_eq!(first, "user,balance\nalice,0\nbob,7\n");

    // bob already exists in the database but is not part of this batch
    let second = batch(
        "command,user,counterparty,amount,description\n\
         deposit,alice,,3,\n\
         withdraw,bob,,100,\n",
    );
    assert_eq!(second, "user,balance\nalice,3\n");
}
