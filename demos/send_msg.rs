//! Client node example.
//!
//! Looks the peer up in EPMD, runs the handshake, and sends one message to a registered name on
//! the peer node.
//!
//! # Usage
//!
//! ```bash
//! $ cargo run --example send_msg -- --peer foo@localhost --destination foo --cookie erlang_cookie -m hello
//! ```
use clap::Parser;
use erl_term_dist::term::{Atom, Pid, Term};
use erl_term_dist::{channel, message::Message, Handshake};

#[derive(Debug, Parser)]
#[clap(name = "send_msg")]
struct Args {
    #[clap(long = "peer", default_value = "foo@localhost")]
    peer_name: String,

    #[clap(long, default_value = "WPKYDIOSJIMJUURLRUHV")]
    cookie: String,

    #[clap(long = "self", default_value = "bar@localhost")]
    self_node: String,

    #[clap(long, short, default_value = "foo")]
    destination: String,

    #[clap(long, short, default_value = "hello_world")]
    message: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    smol::block_on(async {
        let handshake = Handshake::new(&args.self_node, &args.cookie);
        let connected = handshake.connect(&args.peer_name).await?;
        println!("# Connected: {}", connected.peer_name);
        println!("# Peer flags: {:?}", connected.peer_flags);

        let (mut tx, _rx) = channel(connected.transport, connected.peer_flags);
        let message = Message::RegSend(erl_term_dist::message::RegSend {
            from_pid: Pid {
                node: Atom::new(&args.self_node),
                id: 0,
                serial: 0,
                creation: 0,
            },
            to_name: Atom::new(&args.destination),
            message: Term::atom(args.message.as_str()),
        });
        println!("# Send: {message:?}");
        tx.send(message).await?;
        println!("# DONE");
        Ok(())
    })
}
