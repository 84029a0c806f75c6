use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

use imap_engine::{
    CheckStatus, ClientBuilder, ConnectionPool, Credentials, Error, Flag, MailboxPath,
    SessionState,
};

/// One step of a scripted conversation: the command the client must send (without its tag) and
/// the lines to answer with. `{tag}` in the reply stands for the tag of the command.
type Step = (&'static str, String);

/// Run a scripted IMAP server on a loopback port, greeting with `greeting`.
fn serve(greeting: &'static str, script: Vec<Step>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        writer.write_all(greeting.as_bytes()).unwrap();
        for (expected, reply) in script {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let (tag, command) = line.trim_end().split_once(' ').unwrap();
            assert!(
                command.starts_with(expected),
                "expected {:?}, got {:?}",
                expected,
                command
            );
            writer.write_all(reply.replace("{tag}", tag).as_bytes()).unwrap();
        }
        // wait for the client to hang up
        let mut rest = Vec::new();
        let _ = reader.read_to_end(&mut rest);
    });
    (port, handle)
}

const GREETING: &str = "* OK [CAPABILITY IMAP4rev1 IDLE] test server ready\r\n";

fn header(seq: usize, flags: &str, subject: &str) -> String {
    let block = format!(
        "From: sender@example.com\r\nSubject: {}\r\n\r\n",
        subject
    );
    format!(
        "* {} FETCH (FLAGS ({}) INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE {} \
         BODY[HEADER.FIELDS (DATE FROM TO CC SUBJECT MESSAGE-ID IN-REPLY-TO REFERENCES)] \
         {{{}}}\r\n{})\r\n",
        seq,
        flags,
        2000 + subject.len(),
        block.len(),
        block
    )
}

fn ok(text: &str) -> String {
    format!("{{tag}} OK {}\r\n", text)
}

fn select_steps(subjects: &[&str]) -> Vec<Step> {
    let headers: String = subjects
        .iter()
        .enumerate()
        .map(|(i, s)| header(i + 1, "\\Seen", s))
        .collect();
    vec![
        (
            "SELECT \"INBOX\"",
            format!(
                "* {} EXISTS\r\n* 0 RECENT\r\n{}",
                subjects.len(),
                ok("[READ-WRITE] SELECT completed")
            ),
        ),
        ("FETCH 1:", headers + &ok("FETCH completed")),
    ]
}

fn subjects(session: &imap_engine::Session<imap_engine::Connection>) -> Vec<String> {
    session
        .context()
        .unwrap()
        .headers()
        .iter()
        .map(|h| h.envelope.subject.clone().unwrap_or_default())
        .collect()
}

#[test]
fn login_select_and_new_mail() {
    let mut script = vec![("LOGIN \"fred\" \"secret\"", ok("LOGIN completed"))];
    script.extend(select_steps(&["one", "two"]));
    script.push((
        "NOOP",
        format!("* 3 EXISTS\r\n* 1 RECENT\r\n{}", ok("NOOP completed")),
    ));
    script.push((
        "FETCH 3:3",
        header(3, "\\Recent", "three") + &ok("FETCH completed"),
    ));
    script.push(("LOGOUT", "* BYE see you\r\n".to_string() + &ok("LOGOUT completed")));
    let (port, server) = serve(GREETING, script);

    let mut session = ClientBuilder::new("127.0.0.1", port).connect().unwrap();
    session
        .authenticate(&mut Credentials::new("fred", "secret"))
        .unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);

    let ctx = session.select("INBOX").unwrap();
    assert_eq!(ctx.len(), 2);
    assert_eq!(
        ctx.get(0).unwrap().envelope.from.as_deref(),
        Some("sender@example.com")
    );

    assert_eq!(session.check_mailbox().unwrap(), CheckStatus::NewMail);
    assert_eq!(subjects(&session), vec!["one", "two", "three"]);
    assert_eq!(session.context().unwrap().new_messages(), 1);

    session.logout().unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    drop(session);
    server.join().unwrap();
}

#[test]
fn sync_expunge_and_reconcile() {
    let mut script = select_steps(&["a", "b", "c"]);
    script.push(("STORE 2 +FLAGS.SILENT (\\Deleted)", ok("STORE completed")));
    script.push(("STORE 3 +FLAGS.SILENT (\\Flagged)", ok("STORE completed")));
    script.push((
        "EXPUNGE",
        format!("* 2 EXPUNGE\r\n* 2 EXISTS\r\n{}", ok("EXPUNGE completed")),
    ));
    script.extend(select_steps(&["a", "c"]));
    let (port, server) = serve("* PREAUTH [CAPABILITY IMAP4rev1] welcome back\r\n", script);

    let mut session = ClientBuilder::new("127.0.0.1", port).connect().unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    session.select("INBOX").unwrap();
    session.set_cursor(Some(2));
    session.set_flag(1, Flag::Deleted, true).unwrap();
    session.set_flag(2, Flag::Flagged, true).unwrap();
    session.sync_mailbox(true).unwrap();

    assert_eq!(subjects(&session), vec!["a", "c"]);
    assert_eq!(session.cursor(), Some(1));
    let ctx = session.context().unwrap();
    assert_eq!(ctx.deleted(), 0);
    assert_eq!(ctx.changed(), 0);
    drop(session);
    server.join().unwrap();
}

#[test]
fn body_fetch_is_cached() {
    let body = "From: sender@example.com\r\nSubject: one\r\n\r\nHello there.\r\n";
    let mut script = select_steps(&["one"]);
    script.push((
        "FETCH 1 RFC822",
        format!(
            "* 1 FETCH (RFC822 {{{}}}\r\n{})\r\n{}",
            body.len(),
            body,
            ok("FETCH completed")
        ),
    ));
    let (port, server) = serve("* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n", script);

    let mut session = ClientBuilder::new("127.0.0.1", port).connect().unwrap();
    session.select("INBOX").unwrap();
    for _ in 0..2 {
        let mut text = String::new();
        session
            .fetch_body(0)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, body);
    }
    drop(session);
    server.join().unwrap();
}

#[test]
fn bye_disconnects() {
    let script = vec![("NOOP", "* BYE shutting down\r\n".to_string())];
    let (port, server) = serve("* PREAUTH hi\r\n", script);

    let mut session = ClientBuilder::new("127.0.0.1", port).connect().unwrap();
    match session.noop() {
        Err(Error::Bye(text)) => assert_eq!(text, "shutting down"),
        r => panic!("unexpected {:?}", r),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(session.noop(), Err(Error::ConnectionLost)));
    drop(session);
    server.join().unwrap();
}

#[test]
fn pool_reuses_connection() {
    let script = vec![
        ("LOGIN", ok("LOGIN completed")),
        ("LIST \"\" \"*\"", format!(
            "* LIST (\\HasNoChildren) \".\" INBOX\r\n* LIST () \".\" \"Lists.rust\"\r\n{}",
            ok("LIST completed")
        )),
        ("STATUS \"Lists.rust\"", format!(
            "* STATUS \"Lists.rust\" (MESSAGES 4 RECENT 0 UNSEEN 1 UIDNEXT 9 UIDVALIDITY 7)\r\n{}",
            ok("STATUS completed")
        )),
    ];
    let (port, server) = serve(GREETING, script);
    let path: MailboxPath = format!("{{127.0.0.1:{}}}Lists.rust", port).parse().unwrap();

    let mut pool = ConnectionPool::new();
    let mut creds = Credentials::new("fred", "secret");
    let mut session = pool.checkout(&path.host, path.port, &mut creds).unwrap();
    let names = session.list("", "*").unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(session.delimiter(), Some('.'));
    pool.checkin(&path.host, path.port, session);
    assert_eq!(pool.idle_count(&path.host, path.port), 1);

    let mut session = pool.checkout(&path.host, path.port, &mut creds).unwrap();
    let status = session.status(path.mailbox_or_inbox()).unwrap();
    assert_eq!(status.messages, 4);
    assert_eq!(status.unseen, Some(1));
    drop(session);
    server.join().unwrap();
}
