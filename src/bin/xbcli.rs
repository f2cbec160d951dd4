/**
    xenstore-rs provides a Rust based xenstore implementation.
    Copyright (C) 2016 Star Lab Corp.

    This program is free software; you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation; either version 2 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License along
    with this program; if not, see <http://www.gnu.org/licenses/>.
**/
#[macro_use]
extern crate clap;
extern crate stderrlog;
extern crate xenbus;

use clap::{Arg, App, SubCommand};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;
use xenbus::client::Client;
use xenbus::error::Error;
use xenbus::transaction::ROOT_TRANSACTION;
use xenbus::transport;
use xenbus::wire;

fn exit_err(err: Error) -> ! {
    eprintln!("xbcli: {}", err);
    std::process::exit(1);
}

fn main() {

    let m = App::new("xbcli")
        .version(crate_version!())
        .max_term_width(72)
        .about("Command line access to the info and configuration space of the system")
        .arg(Arg::with_name("quiet").help("Silences all log messages").short("q"))
        .arg(Arg::with_name("verbose")
                 .help("Provide multiple times to increase verbosity of log output")
                 .short("v")
                 .multiple(true))
        .arg(Arg::with_name("socket")
                 .help("Path of the xenstored unix socket")
                 .long("socket")
                 .takes_value(true))
        .subcommand(SubCommand::with_name("ls")
                        .about("List the entries under a path")
                        .arg(Arg::with_name("path").required(true)))
        .subcommand(SubCommand::with_name("read")
                        .about("Read the value of a path")
                        .arg(Arg::with_name("path").required(true)))
        .subcommand(SubCommand::with_name("write")
                        .about("Write a value to a path")
                        .arg(Arg::with_name("path").required(true))
                        .arg(Arg::with_name("value").required(true)))
        .subcommand(SubCommand::with_name("mkdir")
                        .about("Create an empty directory")
                        .arg(Arg::with_name("path").required(true)))
        .subcommand(SubCommand::with_name("rm")
                        .about("Remove a path")
                        .arg(Arg::with_name("path").required(true)))
        .subcommand(SubCommand::with_name("exists")
                        .about("Check whether a path exists")
                        .arg(Arg::with_name("path").required(true)))
        .subcommand(SubCommand::with_name("watch")
                        .about("Print every change fired for a path")
                        .arg(Arg::with_name("path").required(true)))
        .get_matches();

    stderrlog::new()
        .module(module_path!())
        .module("xenbus")
        .verbosity(m.occurrences_of("verbose") as usize)
        .quiet(m.is_present("quiet"))
        .init()
        .unwrap();

    let socket = m.value_of("socket").unwrap_or(transport::UDS_PATH);
    let stream = UnixStream::connect(socket).ok().expect("Failed to connect to xenstored");
    let client = Client::new(stream).ok().expect("Failed to bring up the xenstore client");

    match m.subcommand() {
        ("ls", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            match client.directory(ROOT_TRANSACTION, path, "") {
                Ok(entries) => {
                    for entry in entries {
                        println!("{}", entry);
                    }
                }
                Err(err) => exit_err(err),
            }
        }
        ("read", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            match client.read(ROOT_TRANSACTION, path, "") {
                Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
                Err(err) => exit_err(err),
            }
        }
        ("write", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            let value = sub.value_of("value").unwrap();
            if let Err(err) = client.write(ROOT_TRANSACTION, path, "", value) {
                exit_err(err);
            }
        }
        ("mkdir", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            if let Err(err) = client.mkdir(ROOT_TRANSACTION, path, "") {
                exit_err(err);
            }
        }
        ("rm", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            if let Err(err) = client.rm(ROOT_TRANSACTION, path, "") {
                exit_err(err);
            }
        }
        ("exists", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            match client.exists(ROOT_TRANSACTION, path, "") {
                Ok(true) => println!("true"),
                Ok(false) => {
                    println!("false");
                    std::process::exit(1);
                }
                Err(err) => exit_err(err),
            }
        }
        ("watch", Some(sub)) => {
            let path = sub.value_of("path").unwrap();
            let registered = client.register_watch(path, |_, vec| {
                println!("{}", vec[wire::XS_WATCH_PATH]);
            });
            match registered {
                // the watch prints from the dispatcher until we are killed
                Ok(_watch) => {
                    loop {
                        thread::sleep(Duration::from_secs(3600));
                    }
                }
                Err(err) => exit_err(err),
            }
        }
        _ => {
            eprintln!("{}", m.usage());
            std::process::exit(2);
        }
    }
}
