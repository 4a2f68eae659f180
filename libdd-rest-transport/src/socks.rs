// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client side of the SOCKS5 handshake (RFC 1928) with optional
//! username/password authentication (RFC 1929).

use std::io;
use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const VERSION: u8 = 0x05;
const AUTH_VERSION: u8 = 0x01;
const METHOD_NONE: u8 = 0x00;
const METHOD_USER: u8 = 0x02;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_V4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_V6: u8 = 0x04;

/// Username/password pair offered to the SOCKS server.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct SocksAuth {
    pub(crate) user: String,
    pub(crate) pass: String,
}

impl std::fmt::Debug for SocksAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocksAuth")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

fn protocol_error(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Negotiate a tunnel to `host:port` over an already connected `stream`.
///
/// On success the stream carries the tunnelled connection.
pub(crate) async fn socks5_connect<S>(
    stream: &mut S,
    auth: Option<&SocksAuth>,
    host: &str,
    port: u16,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    login(stream, auth).await?;

    let mut request = vec![VERSION, CMD_CONNECT, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(ATYP_V4);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(ATYP_V6);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "SOCKS target host is too long")
            })?;
            request.push(ATYP_DOMAIN);
            request.push(len);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(protocol_error(format!(
            "invalid SOCKS reply version {}",
            head[0]
        )));
    }
    if head[1] != 0x00 {
        return Err(reply_error(head[1]));
    }
    // bound address, unused
    let addr_len = match head[3] {
        ATYP_V4 => 4,
        ATYP_V6 => 16,
        ATYP_DOMAIN => usize::from(stream.read_u8().await?),
        other => {
            return Err(protocol_error(format!(
                "invalid SOCKS address type {other}"
            )))
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

async fn login<S>(stream: &mut S, auth: Option<&SocksAuth>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting: &[u8] = match auth {
        Some(_) => &[VERSION, 2, METHOD_NONE, METHOD_USER],
        None => &[VERSION, 1, METHOD_NONE],
    };
    stream.write_all(greeting).await?;
    stream.flush().await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != VERSION {
        return Err(protocol_error(format!(
            "invalid SOCKS version {}",
            choice[0]
        )));
    }
    match (choice[1], auth) {
        (METHOD_NONE, _) => Ok(()),
        (METHOD_USER, Some(auth)) => proceed_with_user(stream, auth).await,
        (METHOD_NO_ACCEPTABLE, _) | (METHOD_USER, None) => Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "no acceptable SOCKS authentication method",
        )),
        (other, _) => Err(protocol_error(format!(
            "unsupported SOCKS authentication method {other}"
        ))),
    }
}

async fn proceed_with_user<S>(stream: &mut S, auth: &SocksAuth) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let too_long = || io::Error::new(io::ErrorKind::InvalidInput, "SOCKS credential too long");
    let user_len = u8::try_from(auth.user.len()).map_err(|_| too_long())?;
    let pass_len = u8::try_from(auth.pass.len()).map_err(|_| too_long())?;

    let mut msg = Vec::with_capacity(3 + auth.user.len() + auth.pass.len());
    msg.push(AUTH_VERSION);
    msg.push(user_len);
    msg.extend_from_slice(auth.user.as_bytes());
    msg.push(pass_len);
    msg.extend_from_slice(auth.pass.as_bytes());
    stream.write_all(&msg).await?;
    stream.flush().await?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "SOCKS authentication rejected",
        ));
    }
    Ok(())
}

fn reply_error(code: u8) -> io::Error {
    let (kind, msg) = match code {
        0x02 => (io::ErrorKind::PermissionDenied, "connection not allowed by ruleset"),
        0x03 => (io::ErrorKind::ConnectionRefused, "network unreachable"),
        0x04 => (io::ErrorKind::ConnectionRefused, "host unreachable"),
        0x05 => (io::ErrorKind::ConnectionRefused, "connection refused"),
        0x06 => (io::ErrorKind::TimedOut, "TTL expired"),
        0x07 => (io::ErrorKind::Unsupported, "command not supported"),
        0x08 => (io::ErrorKind::Unsupported, "address type not supported"),
        _ => (io::ErrorKind::Other, "general SOCKS server failure"),
    };
    io::Error::new(kind, format!("SOCKS proxy: {msg}"))
}
