/*!

This is the long-form manual for `ranked_vote` and `rcv-import`.

## Input formats

The following formats are supported:
* `us_ca_sfo` San Francisco fixed-width master lookup and ballot image
* `us_me` Maine cast vote record spreadsheets
* `us_nm_saf` Santa Fe zipped CSV cast vote record export
* `us_vt_btv` Burlington zipped pile report

### `us_ca_sfo`

Two text files, in this order: the master lookup and the ballot image.
Every line of the master lookup is a fixed-width record:

| bytes   | field          |
|---------|----------------|
| 0..10   | record type (`Contest`, `Candidate`, ...) |
| 10..17  | record id      |
| 17..67  | description    |
| 67..74  | list order     |
| 74..81  | contest id     |
| 81..82  | write-in flag  |
| 82..83  | provisional flag |

Every line of the ballot image is one mark of one voter:

| bytes   | field          |
|---------|----------------|
| 0..7    | contest id     |
| 7..16   | voter id       |
| 16..23  | serial number  |
| 23..26  | tally type     |
| 26..33  | precinct       |
| 33..36  | vote rank      |
| 36..43  | candidate id   |
| 43..44  | overvote flag  |
| 44..45  | undervote flag |

The marks of one voter for one contest must be on consecutive lines: a voter
that shows up again after other voters stops the import with an error.
The `contest` option (a contest id) selects a contest when the ballot image
covers several of them.

### `us_me`

One or more Excel workbooks. The first worksheet has a `Cast Vote Record`
column and one column per rank, named like `REP Governor 1st Choice`,
`REP Governor 2nd Choice`... Cells contain `undervote`, `overvote`,
`Write-in` or a name such as `DEM Mills, Janet T. (13452)`, which is read
as `Janet T. Mills`.

### `us_nm_saf`

A zip archive with the tables `csvFiles/ContestManifest.csv`,
`csvFiles/CandidateManifest.csv` and `csvFiles/CvrExport.csv`. The
`contest` option (the description of the contest in the manifest) is
mandatory.

### `us_vt_btv`

A zip archive holding a text pile report. The `report_path` option (the
path of the report inside the archive, `reportPath` in the configuration
file, `--report-path` on the command line) is mandatory. The report declares the
candidates first:

```text
.CANDIDATE C01, "Miro Weinberger"
.CANDIDATE C02, "Kurt Wright"
.FINAL-PILE
0001, 1) C01,C02
0002, 1) C02
```

An unknown candidate id on a ballot line is read as an overvote.

## Normalization

| format      | skipped rank                    | overvote       | repeated candidate |
|-------------|---------------------------------|----------------|--------------------|
| `us_ca_sfo` | skipped                         | exhausts       | skipped            |
| `us_me`     | two in a row exhaust the ballot | exhausts       | skipped            |
| `us_nm_saf` | skipped                         | exhausts       | skipped            |
| `us_vt_btv` | skipped                         | exhausts       | skipped            |

Normalized ballots keep the number of ranks of the raw ballots: the end of
the ballot is filled with undervotes.

## Configuration

`rcv-import` accepts a configuration file in JSON:

```text
{
  "format": "us_nm_saf",
  "files": ["CVR_Export.zip"],
  "params": { "contest": "Mayor" },
  "normalize": true
}
```

Relative file paths are resolved against the directory of the configuration
file. Options passed on the command line take precedence.

 */
