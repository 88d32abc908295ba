use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::consts::*;
use crate::domain::{Destination, ProxyError, Result};

/// What the client asked for after the method negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksRequest {
    Connect(Destination),
    /// A well-formed request for a command other than CONNECT.
    Unsupported { command: u8, destination: Destination },
    /// The address could not be read, so the rest of the request is unknown.
    UnknownAddressType(u8),
}

/// Read the greeting and select "no authentication" if the client offers it.
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        return Err(ProxyError::Socks(format!("unsupported version {:#04x}", header[0])));
    }

    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;

    if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        stream.write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]).await?;
        stream.flush().await?;
        Ok(())
    } else {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        Err(ProxyError::Socks(format!("no acceptable method in {:?}", methods)))
    }
}

/// Read a request.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub async fn read_request<S>(stream: &mut S) -> Result<SocksRequest>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        return Err(ProxyError::Socks(format!("unsupported version {:#04x}", header[0])));
    }

    let command = header[1];
    let destination = match read_address(stream, header[3]).await? {
        Some(destination) => destination,
        None => return Ok(SocksRequest::UnknownAddressType(header[3])),
    };

    if command == SOCKS5_CMD_TCP_CONNECT {
        Ok(SocksRequest::Connect(destination))
    } else {
        Ok(SocksRequest::Unsupported { command, destination })
    }
}

async fn read_address<S>(stream: &mut S, addr_type: u8) -> Result<Option<Destination>>
where
    S: AsyncRead + Unpin,
{
    let host = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ipv4Addr::from(addr).to_string()
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            if len == 0 {
                return Err(ProxyError::Socks("empty domain name".to_string()));
            }
            let mut domain = vec![0u8; len];
            stream.read_exact(&mut domain).await?;
            String::from_utf8(domain).map_err(|e| ProxyError::Socks(format!("invalid domain name: {}", e)))?
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            Ipv6Addr::from(addr).to_string()
        }
        _ => return Ok(None),
    };

    let port = stream.read_u16().await?;
    Ok(Some(Destination::new(host, port)))
}

/// Encode a reply. The bound address is always reported as `0.0.0.0:0`.
pub fn encode_reply(code: u8) -> [u8; 10] {
    [
        SOCKS5_VERSION,
        code,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Reply code for a failed dial.
pub fn reply_code(err: &ProxyError) -> u8 {
    match err {
        ProxyError::DialFailed { kind, .. } => match kind {
            io::ErrorKind::ConnectionRefused => SOCKS5_REPLY_CONNECTION_REFUSED,
            io::ErrorKind::TimedOut
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => SOCKS5_REPLY_HOST_UNREACHABLE,
            io::ErrorKind::PermissionDenied => SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
            _ => SOCKS5_REPLY_GENERAL_FAILURE,
        },
        _ => SOCKS5_REPLY_GENERAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::duplex;

    fn request(command: u8, addr_type: u8, addr: &[u8], port: u16) -> Vec<u8> {
        let mut buf = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED, addr_type];
        buf.extend_from_slice(addr);
        buf.extend_from_slice(&port.to_be_bytes());
        buf
    }

    #[tokio::test]
    async fn test_negotiate_selects_no_auth() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[SOCKS5_VERSION, 2, 0x02, 0x00]).await.unwrap();

        negotiate(&mut server).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
    }

    #[tokio::test]
    async fn test_negotiate_rejects_auth_only_clients() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[SOCKS5_VERSION, 1, 0x02]).await.unwrap();

        assert!(matches!(negotiate(&mut server).await, Err(ProxyError::Socks(_))));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE]);
    }

    #[tokio::test]
    async fn test_negotiate_rejects_other_versions() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x04, 1, 0x00]).await.unwrap();
        assert!(matches!(negotiate(&mut server).await, Err(ProxyError::Socks(_))));
    }

    #[tokio::test]
    async fn test_read_connect_ipv4() {
        let mut stream = Cursor::new(request(SOCKS5_CMD_TCP_CONNECT, SOCKS5_ADDR_TYPE_IPV4, &[192, 168, 1, 1], 8080));
        let req = read_request(&mut stream).await.unwrap();
        assert_eq!(req, SocksRequest::Connect(Destination::new("192.168.1.1", 8080)));
    }

    #[tokio::test]
    async fn test_read_connect_domain() {
        let mut addr = vec![11u8];
        addr.extend_from_slice(b"example.com");
        let mut stream = Cursor::new(request(SOCKS5_CMD_TCP_CONNECT, SOCKS5_ADDR_TYPE_DOMAIN, &addr, 443));
        let req = read_request(&mut stream).await.unwrap();
        assert_eq!(req, SocksRequest::Connect(Destination::new("example.com", 443)));
    }

    #[tokio::test]
    async fn test_read_connect_ipv6() {
        let mut addr = [0u8; 16];
        addr[15] = 1;
        let mut stream = Cursor::new(request(SOCKS5_CMD_TCP_CONNECT, SOCKS5_ADDR_TYPE_IPV6, &addr, 22));
        let req = read_request(&mut stream).await.unwrap();
        match req {
            SocksRequest::Connect(dest) => assert_eq!(dest.to_string(), "[::1]:22"),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_unsupported_command() {
        let mut stream = Cursor::new(request(0x03, SOCKS5_ADDR_TYPE_IPV4, &[0, 0, 0, 0], 0));
        let req = read_request(&mut stream).await.unwrap();
        assert!(matches!(req, SocksRequest::Unsupported { command: 0x03, .. }));
    }

    #[tokio::test]
    async fn test_read_unknown_address_type() {
        let mut stream = Cursor::new(vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, 0, 0x09]);
        let req = read_request(&mut stream).await.unwrap();
        assert_eq!(req, SocksRequest::UnknownAddressType(0x09));
    }

    #[tokio::test]
    async fn test_read_empty_domain_is_an_error() {
        let mut stream = Cursor::new(request(SOCKS5_CMD_TCP_CONNECT, SOCKS5_ADDR_TYPE_DOMAIN, &[0], 80));
        assert!(read_request(&mut stream).await.is_err());
    }

    #[test]
    fn test_reply_code_from_dial_error() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, SOCKS5_REPLY_CONNECTION_REFUSED),
            (io::ErrorKind::TimedOut, SOCKS5_REPLY_HOST_UNREACHABLE),
            (io::ErrorKind::AddrNotAvailable, SOCKS5_REPLY_HOST_UNREACHABLE),
            (io::ErrorKind::HostUnreachable, SOCKS5_REPLY_HOST_UNREACHABLE),
            (io::ErrorKind::NetworkUnreachable, SOCKS5_REPLY_HOST_UNREACHABLE),
            (io::ErrorKind::PermissionDenied, SOCKS5_REPLY_CONNECTION_NOT_ALLOWED),
            (io::ErrorKind::Other, SOCKS5_REPLY_GENERAL_FAILURE),
        ];
        for (kind, code) in cases {
            let err = ProxyError::dial("example.com:80", &io::Error::from(kind));
            assert_eq!(reply_code(&err), code, "{:?}", kind);
        }
        assert_eq!(
            reply_code(&ProxyError::Io("boom".to_string())),
            SOCKS5_REPLY_GENERAL_FAILURE
        );
    }

    #[test]
    fn test_encode_reply() {
        assert_eq!(
            encode_reply(SOCKS5_REPLY_SUCCEEDED),
            [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
    }
}
